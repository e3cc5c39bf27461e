//! Error types for BLE platform operations.
//!
//! Platform failures carry the numeric code reported by the BLE stack
//! (the `10001..10012` family). [`BleError::user_message`] maps every error
//! to the text shown to the end user.

use cellar_core::constants::{
    ERR_ADAPTER_UNAVAILABLE, ERR_CHARACTERISTIC_FAILED, ERR_CONNECTION_FAILED,
    ERR_CONNECTION_TIMEOUT, ERR_NO_CONNECTION, ERR_NO_DEVICE, ERR_SYSTEM,
};

/// Result type alias for BLE operations.
pub type Result<T> = std::result::Result<T, BleError>;

/// Fallback text when neither the code nor the platform message helps.
pub const GENERIC_FAILURE_MESSAGE: &str = "Operation failed, please retry";

/// Errors that can occur during BLE operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BleError {
    /// The platform stack rejected an operation.
    #[error("BLE platform error {code}: {message}")]
    Platform { code: i32, message: String },

    /// Bluetooth permission has not been granted.
    #[error("Bluetooth permission not granted")]
    PermissionDenied,

    /// Address is not in the connection table.
    #[error("Not connected: {address}")]
    NotConnected { address: String },

    /// Discovery event stream closed unexpectedly.
    #[error("Discovery stream closed")]
    DiscoveryClosed,
}

impl BleError {
    /// Create a new platform error.
    pub fn platform(code: i32, message: impl Into<String>) -> Self {
        Self::Platform {
            code,
            message: message.into(),
        }
    }

    /// Create a new not-connected error.
    pub fn not_connected(address: impl ToString) -> Self {
        Self::NotConnected {
            address: address.to_string(),
        }
    }

    /// Platform error code, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Platform { code, .. } => Some(*code),
            Self::NotConnected { .. } => Some(ERR_NO_CONNECTION),
            _ => None,
        }
    }

    /// Message for the end user.
    ///
    /// # Examples
    ///
    /// ```
    /// use cellar_ble::BleError;
    ///
    /// let error = BleError::platform(10001, "openBluetoothAdapter:fail");
    /// assert_eq!(error.user_message(), "Bluetooth is off, enable Bluetooth and retry");
    ///
    /// let error = BleError::platform(-1, "");
    /// assert_eq!(error.user_message(), "Operation failed, please retry");
    /// ```
    pub fn user_message(&self) -> String {
        if let Some(message) = self.code().and_then(message_for_code) {
            return message.to_string();
        }

        match self {
            Self::Platform { message, .. } if !message.trim().is_empty() => message.clone(),
            Self::PermissionDenied => "Authorize Bluetooth and retry".to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// User-facing message for a known platform error code.
pub fn message_for_code(code: i32) -> Option<&'static str> {
    let message = match code {
        ERR_ADAPTER_UNAVAILABLE => "Bluetooth is off, enable Bluetooth and retry",
        ERR_NO_DEVICE => "Device not found nearby",
        ERR_CONNECTION_FAILED => "Connection failed, please retry",
        ERR_CONNECTION_TIMEOUT => "Connection timeout, ensure the device is nearby",
        ERR_NO_CONNECTION => "Connection lost",
        ERR_CHARACTERISTIC_FAILED => "Characteristic write failed",
        ERR_SYSTEM => "System reported an error",
        _ => return None,
    };
    Some(message)
}
