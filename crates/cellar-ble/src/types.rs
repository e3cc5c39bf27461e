//! Value types exchanged with the BLE platform.

use bytes::Bytes;
use cellar_core::{TransportAddress, constants::DEFAULT_POLL_INTERVAL_MS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Bluetooth authorization state of the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// The user has granted Bluetooth access.
    Granted,
    /// Access was never requested.
    Undetermined,
    /// Access was refused; only the system settings page can change it.
    Denied,
}

/// One advertisement delivered by a discovery session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub address: TransportAddress,
    pub rssi: i16,
    /// Raw manufacturer payload.
    pub advertisement: Bytes,
    pub received_at: DateTime<Utc>,
}

impl ScanRecord {
    /// Create a record stamped with the current time.
    pub fn new(address: TransportAddress, rssi: i16, advertisement: impl Into<Bytes>) -> Self {
        Self {
            address,
            rssi,
            advertisement: advertisement.into(),
            received_at: Utc::now(),
        }
    }
}

/// Parameters for starting discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Report the same peripheral repeatedly.
    pub allow_duplicates: bool,
    /// Requested spacing between discovery callbacks.
    pub interval: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            allow_duplicates: true,
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Connection state event reported by the BLE stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStateChange {
    pub address: TransportAddress,
    pub connected: bool,
}

/// A GATT characteristic exposed by a connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub writable: bool,
}

impl CharacteristicInfo {
    pub fn new(uuid: Uuid, writable: bool) -> Self {
        Self { uuid, writable }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_defaults() {
        let options = DiscoveryOptions::default();
        assert!(options.allow_duplicates);
        assert_eq!(options.interval, Duration::from_millis(50));
    }

    #[test]
    fn test_permission_serde() {
        let json = serde_json::to_string(&PermissionState::Undetermined).unwrap();
        assert_eq!(json, "\"undetermined\"");
    }
}
