use crate::{Result, constants::MAX_DEVICE_ID, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable numeric device identifier (24-bit, non-zero).
///
/// This is the id printed on the device and embedded in every status
/// advertisement. It survives reboots and app sessions, unlike the
/// [`TransportAddress`] the BLE stack hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct DeviceId(u32);

impl DeviceId {
    /// Create a new device ID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidDeviceId` if the ID is zero or does not fit 24 bits.
    pub fn new(id: u32) -> Result<Self> {
        if id == 0 || id > MAX_DEVICE_ID {
            return Err(Error::InvalidDeviceId(format!(
                "Device ID must be 1-{MAX_DEVICE_ID}, got {id}"
            )));
        }
        Ok(DeviceId(id))
    }

    /// Get the raw device ID.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: u32 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidDeviceId(format!("Not a number: {s}")))?;
        DeviceId::new(id)
    }
}

impl TryFrom<u32> for DeviceId {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        DeviceId::new(value)
    }
}

impl From<DeviceId> for u32 {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// Platform-assigned BLE address of a peripheral.
///
/// Only valid for the discovery session that produced it. Never persist it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransportAddress(String);

impl TransportAddress {
    /// Create a transport address.
    ///
    /// # Errors
    /// Returns `Error::InvalidAddress` if the address is empty.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(Error::InvalidAddress(
                "Transport address must not be empty".to_string(),
            ));
        }
        Ok(TransportAddress(address))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TransportAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TransportAddress::new(s)
    }
}

/// Operating status reported in byte 14 of a status advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Powered, outlet idle.
    PoweredIdle,
    /// Dispensing or charging has started.
    Starting,
    /// Cut off because the load was unplugged.
    UnpluggedCutoff,
    /// Cut off on overload.
    OverloadCutoff,
    /// Cut off on short circuit.
    ShortCircuitCutoff,
    /// Cut off because the order completed.
    FullCutoff,
    /// Cut off manually.
    ManuallyCutoff,
    /// Battery voltage low.
    LowBattery,
    /// Disabled by an administrator.
    AdminDisabled,
    /// Stock depleted.
    StockDepleted,
    /// Water ingress fault.
    FloodFault,
    /// Code not in the firmware table.
    Unknown(u8),
}

impl StatusCode {
    /// Map a raw status byte.
    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => Self::PoweredIdle,
            1 => Self::Starting,
            2 => Self::UnpluggedCutoff,
            3 => Self::OverloadCutoff,
            4 => Self::ShortCircuitCutoff,
            5 => Self::FullCutoff,
            6 => Self::ManuallyCutoff,
            10 => Self::LowBattery,
            30 => Self::AdminDisabled,
            31 => Self::StockDepleted,
            50 => Self::FloodFault,
            other => Self::Unknown(other),
        }
    }

    /// Raw status byte.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::PoweredIdle => 0,
            Self::Starting => 1,
            Self::UnpluggedCutoff => 2,
            Self::OverloadCutoff => 3,
            Self::ShortCircuitCutoff => 4,
            Self::FullCutoff => 5,
            Self::ManuallyCutoff => 6,
            Self::LowBattery => 10,
            Self::AdminDisabled => 30,
            Self::StockDepleted => 31,
            Self::FloodFault => 50,
            Self::Unknown(code) => *code,
        }
    }

    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PoweredIdle => "powered-idle",
            Self::Starting => "starting",
            Self::UnpluggedCutoff => "unplugged-cutoff",
            Self::OverloadCutoff => "overload-cutoff",
            Self::ShortCircuitCutoff => "short-circuit-cutoff",
            Self::FullCutoff => "full-cutoff",
            Self::ManuallyCutoff => "manually-cutoff",
            Self::LowBattery => "low-battery",
            Self::AdminDisabled => "admin-disabled",
            Self::StockDepleted => "stock-depleted",
            Self::FloodFault => "flood-fault",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Label shown to end users of the vending app.
    pub fn label(&self) -> String {
        let label = match self {
            Self::PoweredIdle => "通电停止",
            Self::Starting => "启动中",
            Self::UnpluggedCutoff => "拔插断电",
            Self::OverloadCutoff => "过载断电",
            Self::ShortCircuitCutoff => "短路断电",
            Self::FullCutoff => "充满断电",
            Self::ManuallyCutoff => "主动断电",
            Self::LowBattery => "电池电压低",
            Self::AdminDisabled => "管理员停用",
            Self::StockDepleted => "库存用完",
            Self::FloodFault => "淹水故障",
            Self::Unknown(code) => return format!("未知状态({code})"),
        };
        label.to_string()
    }

    /// Check if this is a known status code.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<u8> for StatusCode {
    fn from(code: u8) -> Self {
        Self::from_u8(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown({code})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Coarse signal quality bucket derived from RSSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl SignalLevel {
    /// Bucket an RSSI reading in dBm.
    ///
    /// # Examples
    ///
    /// ```
    /// use cellar_core::SignalLevel;
    ///
    /// assert_eq!(SignalLevel::from_rssi(-38), SignalLevel::Excellent);
    /// assert_eq!(SignalLevel::from_rssi(-71), SignalLevel::Poor);
    /// ```
    pub fn from_rssi(rssi: i16) -> Self {
        match rssi {
            r if r >= -40 => Self::Excellent,
            r if r >= -55 => Self::Good,
            r if r >= -70 => Self::Fair,
            _ => Self::Poor,
        }
    }
}
