//! BLE platform trait definition.
//!
//! [`BlePlatform`] is the seam between the control logic and the host BLE
//! stack. Every operation the vending client performs on the radio goes
//! through it, so the whole protocol can run against
//! [`MockPlatform`](crate::mock::MockPlatform) in tests.
//!
//! Methods return `impl Future + Send` (Edition 2024 RPITIT) so callers may
//! drive them from spawned Tokio tasks. Implementations may still be written
//! with plain `async fn`.
//!
//! # Object Safety
//!
//! The trait is not object-safe. Use a type parameter:
//!
//! ```no_run
//! use cellar_ble::{BlePlatform, Result};
//!
//! async fn power_cycle<P: BlePlatform>(platform: &P) -> Result<()> {
//!     platform.close_adapter().await?;
//!     platform.open_adapter().await
//! }
//! ```

use crate::error::Result;
use crate::types::{
    CharacteristicInfo, ConnectionStateChange, DiscoveryOptions, PermissionState, ScanRecord,
};
use bytes::Bytes;
use cellar_core::TransportAddress;
use std::future::Future;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// Host BLE stack.
pub trait BlePlatform: Send + Sync + 'static {
    /// Current Bluetooth authorization state.
    fn permission_state(&self) -> impl Future<Output = Result<PermissionState>> + Send;

    /// Ask the user to authorize Bluetooth.
    fn request_permission(&self) -> impl Future<Output = Result<()>> + Send;

    /// Open the system settings page for Bluetooth permissions.
    fn open_permission_settings(&self) -> impl Future<Output = Result<()>> + Send;

    /// Initialize the Bluetooth adapter.
    fn open_adapter(&self) -> impl Future<Output = Result<()>> + Send;

    /// Release the Bluetooth adapter.
    fn close_adapter(&self) -> impl Future<Output = Result<()>> + Send;

    /// Start discovery.
    ///
    /// Each message on the returned channel is one discovery callback and
    /// may carry several advertisements. Dropping the receiver unsubscribes.
    fn start_discovery(
        &self,
        options: DiscoveryOptions,
    ) -> impl Future<Output = Result<mpsc::Receiver<Vec<ScanRecord>>>> + Send;

    /// Stop discovery.
    ///
    /// Fire-and-forget so it can be called from `Drop`.
    fn stop_discovery(&self);

    /// Subscribe to connection state changes reported by the stack.
    fn connection_events(&self) -> broadcast::Receiver<ConnectionStateChange>;

    /// Open a GATT connection.
    fn connect(&self, address: &TransportAddress) -> impl Future<Output = Result<()>> + Send;

    /// Close a GATT connection.
    fn disconnect(&self, address: &TransportAddress) -> impl Future<Output = Result<()>> + Send;

    /// Services discovered so far on a connected peripheral.
    ///
    /// May be empty while the stack is still resolving the GATT table.
    fn services(
        &self,
        address: &TransportAddress,
    ) -> impl Future<Output = Result<Vec<Uuid>>> + Send;

    /// Characteristics of a service.
    fn characteristics(
        &self,
        address: &TransportAddress,
        service: Uuid,
    ) -> impl Future<Output = Result<Vec<CharacteristicInfo>>> + Send;

    /// Write one frame to a characteristic.
    fn write(
        &self,
        address: &TransportAddress,
        service: Uuid,
        characteristic: Uuid,
        data: Bytes,
    ) -> impl Future<Output = Result<()>> + Send;
}
