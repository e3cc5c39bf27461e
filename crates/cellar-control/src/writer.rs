//! Sequential frame writes to the control characteristic.

use bytes::Bytes;
use cellar_ble::{BlePlatform, Result};
use cellar_core::{
    TransportAddress,
    constants::{CONTROL_SERVICE_UUID, HEARTBEAT_PROBE, WRITE_CHARACTERISTIC_UUID},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Writes command frames to a connected device.
///
/// Frames go out strictly in order, each write awaited before the next
/// starts. The first failed write aborts the rest.
pub struct CommandWriter<P: BlePlatform> {
    platform: Arc<P>,
}

impl<P: BlePlatform> CommandWriter<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self { platform }
    }

    /// Write `frames` with `gap` between consecutive frames.
    ///
    /// Returns the number of frames written.
    ///
    /// # Errors
    /// Returns the error of the first failed write.
    pub async fn write_frames(
        &self,
        address: &TransportAddress,
        frames: &[Bytes],
        gap: Duration,
    ) -> Result<usize> {
        for (index, frame) in frames.iter().enumerate() {
            if index > 0 && !gap.is_zero() {
                tokio::time::sleep(gap).await;
            }

            if let Err(e) = self
                .platform
                .write(
                    address,
                    CONTROL_SERVICE_UUID,
                    WRITE_CHARACTERISTIC_UUID,
                    frame.clone(),
                )
                .await
            {
                warn!(
                    %address,
                    frame = index,
                    total = frames.len(),
                    error = %e,
                    "Frame write failed"
                );
                return Err(e);
            }
            trace!(%address, frame = index, len = frame.len(), "Frame written");
        }

        debug!(%address, frames = frames.len(), "All frames written");
        Ok(frames.len())
    }

    /// Write the single-byte liveness probe.
    pub async fn write_probe(&self, address: &TransportAddress) -> Result<()> {
        self.platform
            .write(
                address,
                CONTROL_SERVICE_UUID,
                WRITE_CHARACTERISTIC_UUID,
                Bytes::from_static(&[HEARTBEAT_PROBE]),
            )
            .await
    }
}
