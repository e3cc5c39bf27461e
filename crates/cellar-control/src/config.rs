//! Tunable timing and behavior.
//!
//! Every wait, window and cap used by the control layer lives here. Values
//! are plain milliseconds so a configuration file stays readable:
//!
//! ```json
//! {
//!   "protocol": { "scan_timeout_ms": 12000, "frame_gap_ms": 50 },
//!   "heartbeat": { "interval_ms": 60000 }
//! }
//! ```
//!
//! Missing sections and fields fall back to [`Default`].

use crate::error::{ControlError, Result};
use cellar_ble::ScanRequest;
use cellar_core::{DeviceId, constants::*};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Discovery defaults shared by every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Poll interval requested from the platform.
    pub poll_interval_ms: u64,

    /// Discovery callbacks inspected before giving up.
    pub max_callbacks: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_callbacks: DEFAULT_MAX_CALLBACKS,
        }
    }
}

impl ScanConfig {
    /// Base scan request for `target` with the given window.
    pub fn request(&self, target: DeviceId, timeout_ms: u64) -> ScanRequest {
        ScanRequest::new(target)
            .timeout(Duration::from_millis(timeout_ms))
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
            .max_callbacks(self.max_callbacks)
    }
}

/// Control protocol timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Check Bluetooth authorization before touching the adapter.
    pub require_permission: bool,

    pub scan_timeout_ms: u64,

    /// Overall deadline for the control service to appear.
    pub service_discovery_timeout_ms: u64,

    /// Spacing between service queries.
    pub service_retry_interval_ms: u64,

    /// Pause between command frames.
    pub frame_gap_ms: u64,

    /// Watch the advertisement for a status change after writing.
    pub verify: bool,

    pub verify_settle_ms: u64,
    pub verify_timeout_ms: u64,
    pub verify_max_callbacks: u32,
    pub verify_poll_interval_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            require_permission: true,
            scan_timeout_ms: DEFAULT_SCAN_TIMEOUT_MS,
            service_discovery_timeout_ms: DEFAULT_SERVICE_DISCOVERY_TIMEOUT_MS,
            service_retry_interval_ms: DEFAULT_SERVICE_RETRY_INTERVAL_MS,
            frame_gap_ms: 0,
            verify: true,
            verify_settle_ms: DEFAULT_VERIFY_SETTLE_MS,
            verify_timeout_ms: DEFAULT_VERIFY_TIMEOUT_MS,
            verify_max_callbacks: DEFAULT_VERIFY_MAX_CALLBACKS,
            verify_poll_interval_ms: DEFAULT_VERIFY_POLL_INTERVAL_MS,
        }
    }
}

/// Heartbeat timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Default tick interval.
    pub interval_ms: u64,

    /// Window of the fallback scan probe.
    pub scan_timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            scan_timeout_ms: DEFAULT_HEARTBEAT_SCAN_TIMEOUT_MS,
        }
    }
}

/// Status probe windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub require_permission: bool,
    pub silent_online_timeout_ms: u64,
    pub silent_detail_timeout_ms: u64,
    pub online_timeout_ms: u64,
    pub detail_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            require_permission: true,
            silent_online_timeout_ms: DEFAULT_SILENT_ONLINE_TIMEOUT_MS,
            silent_detail_timeout_ms: DEFAULT_SILENT_DETAIL_TIMEOUT_MS,
            online_timeout_ms: DEFAULT_ONLINE_TIMEOUT_MS,
            detail_timeout_ms: DEFAULT_DETAIL_TIMEOUT_MS,
        }
    }
}

/// Complete control-layer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellarConfig {
    pub scan: ScanConfig,
    pub protocol: ProtocolConfig,
    pub heartbeat: HeartbeatConfig,
    pub probe: ProbeConfig,
}

impl CellarConfig {
    /// Parse a JSON configuration document.
    ///
    /// # Errors
    /// Returns `ControlError::Config` if the document is not valid JSON or a
    /// field has the wrong type.
    ///
    /// # Examples
    ///
    /// ```
    /// use cellar_control::CellarConfig;
    ///
    /// let json = r#"{"heartbeat": {"interval_ms": 5000}}"#;
    /// let config = CellarConfig::from_json_str(json).unwrap();
    /// assert_eq!(config.heartbeat.interval_ms, 5000);
    /// assert_eq!(config.protocol.scan_timeout_ms, 8000);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ControlError::config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
