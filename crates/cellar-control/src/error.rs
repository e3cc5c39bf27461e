//! Error types for control operations.
//!
//! Every failure of a control invocation ends up as a [`ControlError`], and
//! every [`ControlError`] has a message fit for the end user.

use cellar_ble::{BleError, GENERIC_FAILURE_MESSAGE, NotFoundReason, message_for_code};
use cellar_core::{DeviceId, constants::ERR_CHARACTERISTIC_FAILED};

/// Result type alias for control operations.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can end a control invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// The backend command failed validation.
    #[error("Invalid control command: {reason}")]
    InvalidCommand { reason: String },

    /// Bluetooth authorization is missing.
    #[error("Bluetooth permission not granted")]
    PermissionRequired,

    /// A platform operation failed.
    #[error(transparent)]
    Ble(#[from] BleError),

    /// The device did not advertise within the scan window.
    #[error("Device {device_id} not found ({reason:?} after {callbacks} callbacks)")]
    DeviceNotFound {
        device_id: DeviceId,
        reason: NotFoundReason,
        callbacks: u32,
    },

    /// The control service did not appear before the deadline.
    #[error("Service discovery timeout after {timeout_ms}ms")]
    ServiceDiscoveryTimeout { timeout_ms: u64 },

    /// The write characteristic is missing or not writable.
    #[error("Write characteristic not found")]
    CharacteristicNotFound,

    /// The backend could not supply a command.
    #[error("Control command unavailable: {message}")]
    CommandUnavailable { message: String },

    /// The result could not be reported to the backend.
    #[error("Result report failed: {message}")]
    ReportFailed { message: String },

    /// Configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal invariant violated.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ControlError {
    /// Create a new invalid command error.
    pub fn invalid_command(reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            reason: reason.into(),
        }
    }

    /// Create a new command unavailable error.
    pub fn command_unavailable(message: impl Into<String>) -> Self {
        Self::CommandUnavailable {
            message: message.into(),
        }
    }

    /// Create a new report failed error.
    pub fn report_failed(message: impl Into<String>) -> Self {
        Self::ReportFailed {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Message for the end user.
    ///
    /// # Examples
    ///
    /// ```
    /// use cellar_control::ControlError;
    ///
    /// let error = ControlError::invalid_command("odd length");
    /// assert_eq!(error.user_message(), "Invalid control command, please re-fetch");
    /// ```
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCommand { .. } => "Invalid control command, please re-fetch".to_string(),
            Self::PermissionRequired => "Authorize Bluetooth and retry".to_string(),
            Self::Ble(e) => e.user_message(),
            Self::DeviceNotFound { .. } => "Device not found nearby".to_string(),
            Self::ServiceDiscoveryTimeout { .. } => "Service discovery timeout".to_string(),
            Self::CharacteristicNotFound => message_for_code(ERR_CHARACTERISTIC_FAILED)
                .unwrap_or(GENERIC_FAILURE_MESSAGE)
                .to_string(),
            Self::CommandUnavailable { message } if !message.trim().is_empty() => message.clone(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl From<cellar_core::Error> for ControlError {
    fn from(error: cellar_core::Error) -> Self {
        match error {
            cellar_core::Error::InvalidCommand(reason) => Self::InvalidCommand { reason },
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(error: serde_json::Error) -> Self {
        Self::config(error.to_string())
    }
}
