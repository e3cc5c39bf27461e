//! Connection table for GATT links.
//!
//! The [`ConnectionManager`] tracks which transport addresses hold an open
//! link and fires one-shot callbacks when the BLE stack reports a link as
//! lost. It is shared by the control protocol and the heartbeat monitor, so
//! a link opened by one is visible to the other.
//!
//! A link opened with [`connect_device`] also records the numeric id of the
//! device behind it. The record lives exactly as long as the link, so
//! [`device_address`] never answers with an address that is no longer held.
//!
//! # State Events
//!
//! The stack reports connection changes asynchronously. [`spawn_listener`]
//! starts a task feeding those events into [`handle_state_change`]:
//!
//! ```text
//! BlePlatform::connection_events()
//!     │
//!     └─> listener task ──> handle_state_change()
//!                               │
//!                               ├─ connected:    mark address connected
//!                               └─ disconnected: remove, fire callback once
//! ```
//!
//! [`connect_device`]: ConnectionManager::connect_device
//! [`device_address`]: ConnectionManager::device_address
//! [`spawn_listener`]: ConnectionManager::spawn_listener
//! [`handle_state_change`]: ConnectionManager::handle_state_change

use crate::{error::Result, traits::BlePlatform, types::ConnectionStateChange};
use cellar_core::{DeviceId, TransportAddress};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback fired once when a link is reported lost.
pub type DisconnectCallback = Box<dyn FnOnce(&TransportAddress) + Send>;

struct Link {
    device_id: Option<DeviceId>,
    since: DateTime<Utc>,
}

impl Link {
    fn new(device_id: Option<DeviceId>) -> Self {
        Self {
            device_id,
            since: Utc::now(),
        }
    }
}

#[derive(Default)]
struct ConnectionTable {
    connected: HashMap<TransportAddress, Link>,
    callbacks: HashMap<TransportAddress, DisconnectCallback>,
}

/// Shared per-address connection tracker.
pub struct ConnectionManager<P: BlePlatform> {
    platform: Arc<P>,
    table: Mutex<ConnectionTable>,
}

impl<P: BlePlatform> ConnectionManager<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            table: Mutex::new(ConnectionTable::default()),
        }
    }

    fn table(&self) -> MutexGuard<'_, ConnectionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a link to `address`.
    ///
    /// Returns immediately, without a platform call, if the address is
    /// already connected.
    ///
    /// # Errors
    /// Returns the platform error if the link cannot be opened.
    pub async fn connect(&self, address: &TransportAddress) -> Result<()> {
        self.open(address, None).await
    }

    /// Open a link to `address` and record that it belongs to `device_id`.
    ///
    /// An already open link is tagged without a platform call.
    ///
    /// # Errors
    /// Returns the platform error if the link cannot be opened.
    pub async fn connect_device(
        &self,
        device_id: DeviceId,
        address: &TransportAddress,
    ) -> Result<()> {
        self.open(address, Some(device_id)).await
    }

    async fn open(&self, address: &TransportAddress, device_id: Option<DeviceId>) -> Result<()> {
        if let Some(link) = self.table().connected.get_mut(address) {
            if device_id.is_some() {
                link.device_id = device_id;
            }
            debug!(%address, "Already connected");
            return Ok(());
        }

        match self.platform.connect(address).await {
            Ok(()) => {
                self.table()
                    .connected
                    .insert(address.clone(), Link::new(device_id));
                info!(%address, "Connected");
                Ok(())
            }
            Err(e) => {
                warn!(%address, error = %e, "Connection failed");
                Err(e)
            }
        }
    }

    /// Close the link to `address` if one is open.
    ///
    /// The entry is removed even if the platform call fails. The disconnect
    /// callback is left for the stack's state event.
    pub async fn disconnect(&self, address: &TransportAddress) -> Result<()> {
        let was_connected = self.table().connected.remove(address).is_some();
        if !was_connected {
            return Ok(());
        }

        let result = self.platform.disconnect(address).await;
        match &result {
            Ok(()) => info!(%address, "Disconnected"),
            Err(e) => warn!(%address, error = %e, "Disconnect reported an error"),
        }
        result
    }

    pub fn is_connected(&self, address: &TransportAddress) -> bool {
        self.table().connected.contains_key(address)
    }

    /// When the link to `address` was opened.
    pub fn connected_since(&self, address: &TransportAddress) -> Option<DateTime<Utc>> {
        self.table().connected.get(address).map(|link| link.since)
    }

    /// Address of the open link belonging to `device_id`, if any.
    pub fn device_address(&self, device_id: DeviceId) -> Option<TransportAddress> {
        self.table()
            .connected
            .iter()
            .find(|(_, link)| link.device_id == Some(device_id))
            .map(|(address, _)| address.clone())
    }

    /// Addresses with an open link.
    pub fn connected_addresses(&self) -> Vec<TransportAddress> {
        self.table().connected.keys().cloned().collect()
    }

    /// Mark `address` as disconnected without a platform call.
    pub fn mark_disconnected(&self, address: &TransportAddress) {
        if self.table().connected.remove(address).is_some() {
            debug!(%address, "Marked disconnected");
        }
    }

    /// Register the callback for the next reported link loss of `address`.
    ///
    /// Replaces any callback already registered for the address.
    pub fn on_disconnect(
        &self,
        address: &TransportAddress,
        callback: impl FnOnce(&TransportAddress) + Send + 'static,
    ) {
        self.table()
            .callbacks
            .insert(address.clone(), Box::new(callback));
    }

    /// Apply a connection state event from the stack.
    pub fn handle_state_change(&self, change: &ConnectionStateChange) {
        debug!(
            address = %change.address,
            connected = change.connected,
            "Connection state changed"
        );

        if change.connected {
            self.table()
                .connected
                .entry(change.address.clone())
                .or_insert_with(|| Link::new(None));
            return;
        }

        let callback = {
            let mut table = self.table();
            table.connected.remove(&change.address);
            table.callbacks.remove(&change.address)
        };

        // Run outside the lock so the callback may call back into the manager.
        if let Some(callback) = callback {
            callback(&change.address);
        }
    }

    /// Close every open link.
    pub async fn disconnect_all(&self) {
        for address in self.connected_addresses() {
            // Already logged by disconnect.
            let _ = self.disconnect(&address).await;
        }
    }

    /// Start consuming the platform's connection state events.
    ///
    /// The task ends when the platform closes the event stream. Abort the
    /// returned handle to stop it earlier.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.platform.connection_events();
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(change) => manager.handle_state_change(&change),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Connection events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Connection listener stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPlatform, Operation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn address(n: u8) -> TransportAddress {
        TransportAddress::new(format!("11:22:33:44:55:{n:02X}")).unwrap()
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (platform, handle) = MockPlatform::new();
        let manager = ConnectionManager::new(Arc::new(platform));
        let addr = address(1);

        manager.connect(&addr).await.unwrap();
        manager.connect(&addr).await.unwrap();

        assert!(manager.is_connected(&addr));
        assert!(manager.connected_since(&addr).is_some());
        assert_eq!(handle.call_count(Operation::Connect), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_table_empty() {
        let (platform, handle) = MockPlatform::new();
        handle.fail(Operation::Connect, 10003, "connect failed");
        let manager = ConnectionManager::new(Arc::new(platform));

        let error = manager.connect(&address(1)).await.unwrap_err();
        assert_eq!(error.user_message(), "Connection failed, please retry");
        assert!(manager.connected_addresses().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_unknown_address_is_noop() {
        let (platform, handle) = MockPlatform::new();
        let manager = ConnectionManager::new(Arc::new(platform));

        manager.disconnect(&address(5)).await.unwrap();
        assert_eq!(handle.call_count(Operation::Disconnect), 0);
    }

    #[tokio::test]
    async fn test_callback_fires_exactly_once() {
        let (platform, _handle) = MockPlatform::new();
        let manager = ConnectionManager::new(Arc::new(platform));
        let addr = address(2);
        let fired = Arc::new(AtomicUsize::new(0));

        manager.connect(&addr).await.unwrap();
        let counter = Arc::clone(&fired);
        manager.on_disconnect(&addr, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let lost = ConnectionStateChange {
            address: addr.clone(),
            connected: false,
        };
        manager.handle_state_change(&lost);
        manager.handle_state_change(&lost);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!manager.is_connected(&addr));
    }

    #[tokio::test]
    async fn test_listener_tracks_link_loss() {
        let (platform, handle) = MockPlatform::new();
        let manager = Arc::new(ConnectionManager::new(Arc::new(platform)));
        let listener = manager.spawn_listener();
        let addr = address(3);

        manager.connect(&addr).await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        manager.on_disconnect(&addr, move |lost| {
            let _ = tx.send(lost.clone());
        });

        handle.drop_connection(&addr);
        let lost = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(lost, addr);
        assert!(!manager.is_connected(&addr));
        listener.abort();
    }

    fn device(id: u32) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_device_link_lives_with_connection() {
        let (platform, handle) = MockPlatform::new();
        let manager = ConnectionManager::new(Arc::new(platform));
        let addr = address(4);

        manager.connect_device(device(77), &addr).await.unwrap();
        assert_eq!(manager.device_address(device(77)), Some(addr.clone()));
        assert_eq!(manager.device_address(device(78)), None);

        manager.disconnect(&addr).await.unwrap();
        assert_eq!(manager.device_address(device(77)), None);

        manager.connect_device(device(77), &addr).await.unwrap();
        handle.drop_connection(&addr);
        manager.handle_state_change(&ConnectionStateChange {
            address: addr.clone(),
            connected: false,
        });
        assert_eq!(manager.device_address(device(77)), None);

        manager.connect_device(device(77), &addr).await.unwrap();
        manager.mark_disconnected(&addr);
        assert_eq!(manager.device_address(device(77)), None);
    }

    #[tokio::test]
    async fn test_open_link_is_tagged_without_reconnect() {
        let (platform, handle) = MockPlatform::new();
        let manager = ConnectionManager::new(Arc::new(platform));
        let addr = address(6);

        manager.connect(&addr).await.unwrap();
        assert_eq!(manager.device_address(device(9)), None);

        manager.connect_device(device(9), &addr).await.unwrap();
        assert_eq!(manager.device_address(device(9)), Some(addr));
        assert_eq!(handle.call_count(Operation::Connect), 1);
    }

    #[tokio::test]
    async fn test_disconnect_all() {
        let (platform, handle) = MockPlatform::new();
        let manager = ConnectionManager::new(Arc::new(platform));

        manager.connect(&address(1)).await.unwrap();
        manager.connect(&address(2)).await.unwrap();
        manager.disconnect_all().await;

        assert!(manager.connected_addresses().is_empty());
        assert_eq!(handle.call_count(Operation::Disconnect), 2);
        assert!(!handle.is_connected(&address(1)));
    }
}
