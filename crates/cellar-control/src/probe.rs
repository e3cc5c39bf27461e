//! One-shot device status probes.
//!
//! Probes answer "is the device nearby, and what is it doing?" without
//! connecting. They never fail: every problem becomes an offline status
//! carrying a reason.

use crate::config::{ProbeConfig, ScanConfig};
use crate::error::Result;
use crate::permission::ensure_permission;
use cellar_ble::{BlePlatform, ScanHit, Scanner};
use cellar_core::{DeviceId, SignalLevel, TransportAddress};
use cellar_protocol::StatusRecord;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Reason given when the device did not show up.
pub const OFFLINE_MESSAGE: &str = "Device offline or not nearby";

/// Placeholder shown when no remaining time is reported.
pub const NO_REMAINING_DISPLAY: &str = "无";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalInfo {
    pub rssi: i16,
    pub level: SignalLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusInfo {
    pub code: u8,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemainingInfo {
    /// Seconds.
    pub time: u64,
    pub display: String,
    pub quantity: u32,
}

impl Default for RemainingInfo {
    fn default() -> Self {
        Self {
            time: 0,
            display: NO_REMAINING_DISPLAY.to_string(),
            quantity: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderInfo {
    pub order_id: u32,
    pub active: bool,
}

/// Everything a single advertisement says about a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailedDeviceStatus {
    pub online: bool,
    pub device_id: DeviceId,
    pub address: Option<TransportAddress>,
    pub record: Option<StatusRecord>,
    pub signal: Option<SignalInfo>,
    pub status: Option<StatusInfo>,
    pub remaining: RemainingInfo,
    pub order: Option<OrderInfo>,
    pub used_quantity: u32,
    /// Why the device is reported offline.
    pub error: Option<String>,
}

impl DetailedDeviceStatus {
    pub fn offline(device_id: DeviceId, reason: impl Into<String>) -> Self {
        Self {
            online: false,
            device_id,
            address: None,
            record: None,
            signal: None,
            status: None,
            remaining: RemainingInfo::default(),
            order: None,
            used_quantity: 0,
            error: Some(reason.into()),
        }
    }

    pub fn from_hit(hit: ScanHit) -> Self {
        let record = hit.status;
        let display = record.remaining_display();

        Self {
            online: true,
            device_id: record.device_id,
            address: Some(hit.address),
            signal: Some(SignalInfo {
                rssi: hit.rssi,
                level: SignalLevel::from_rssi(hit.rssi),
            }),
            status: Some(StatusInfo {
                code: record.status.as_u8(),
                label: record.status.label(),
            }),
            remaining: RemainingInfo {
                time: record.remaining_time(),
                display: if display.is_empty() {
                    NO_REMAINING_DISPLAY.to_string()
                } else {
                    display
                },
                quantity: record.remaining_quantity(),
            },
            order: Some(OrderInfo {
                order_id: record.order_id,
                active: record.has_active_order(),
            }),
            used_quantity: record.used_quantity,
            error: None,
            record: Some(record),
        }
    }
}

/// Scan-based status probes.
pub struct StatusProbe<P: BlePlatform> {
    scanner: Arc<Scanner<P>>,
    scan_config: ScanConfig,
    config: ProbeConfig,
}

impl<P: BlePlatform> StatusProbe<P> {
    pub fn new(scanner: Arc<Scanner<P>>, scan_config: ScanConfig, config: ProbeConfig) -> Self {
        Self {
            scanner,
            scan_config,
            config,
        }
    }

    /// Whether `device_id` is advertising nearby.
    pub async fn check_online(&self, device_id: DeviceId, silent: bool) -> bool {
        let timeout_ms = if silent {
            self.config.silent_online_timeout_ms
        } else {
            self.config.online_timeout_ms
        };

        match self.find(device_id, timeout_ms, silent).await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                debug!(%device_id, error = %e, "Online check failed");
                false
            }
        }
    }

    /// Full status of `device_id` from its advertisement.
    pub async fn check_detailed(&self, device_id: DeviceId, silent: bool) -> DetailedDeviceStatus {
        let timeout_ms = if silent {
            self.config.silent_detail_timeout_ms
        } else {
            self.config.detail_timeout_ms
        };

        let status = match self.find(device_id, timeout_ms, silent).await {
            Ok(Some(hit)) => DetailedDeviceStatus::from_hit(hit),
            Ok(None) => DetailedDeviceStatus::offline(device_id, OFFLINE_MESSAGE),
            Err(e) => DetailedDeviceStatus::offline(device_id, e.user_message()),
        };

        if !silent {
            info!(%device_id, online = status.online, "Device status checked");
        }
        status
    }

    async fn find(
        &self,
        device_id: DeviceId,
        timeout_ms: u64,
        silent: bool,
    ) -> Result<Option<ScanHit>> {
        if self.config.require_permission {
            ensure_permission(self.scanner.platform().as_ref()).await?;
        }

        let request = self
            .scan_config
            .request(device_id, timeout_ms)
            .silent(silent);
        Ok(self.scanner.scan(request).await?.into_hit())
    }
}
