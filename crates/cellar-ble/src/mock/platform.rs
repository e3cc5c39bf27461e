//! Mock BLE platform implementation.
//!
//! [`MockPlatform`] implements [`BlePlatform`] over in-memory state that a
//! [`MockPlatformHandle`] scripts: discovery sessions, permission state,
//! per-operation failures and GATT layout. Every call is recorded so tests
//! can assert on the exact sequence of radio operations.

use crate::{
    error::{BleError, Result},
    traits::BlePlatform,
    types::{
        CharacteristicInfo, ConnectionStateChange, DiscoveryOptions, PermissionState, ScanRecord,
    },
};
use bytes::Bytes;
use cellar_core::{
    TransportAddress,
    constants::{
        CONTROL_SERVICE_UUID, ERR_ADAPTER_UNAVAILABLE, ERR_NO_CONNECTION,
        WRITE_CHARACTERISTIC_UUID,
    },
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Platform operations recorded by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PermissionState,
    RequestPermission,
    OpenPermissionSettings,
    OpenAdapter,
    CloseAdapter,
    StartDiscovery,
    StopDiscovery,
    Connect,
    Disconnect,
    Services,
    Characteristics,
    Write,
}

impl Operation {
    /// Whether the operation touches the radio (as opposed to permissions).
    pub fn is_radio(&self) -> bool {
        !matches!(
            self,
            Self::PermissionState | Self::RequestPermission | Self::OpenPermissionSettings
        )
    }
}

/// Scripted discovery session: one entry per discovery callback.
type Session = Vec<Vec<ScanRecord>>;

#[derive(Debug)]
struct FailureRule {
    succeed_first: u32,
    code: i32,
    message: String,
}

#[derive(Debug)]
struct ActiveDiscovery {
    _sender: mpsc::Sender<Vec<ScanRecord>>,
    feeder: JoinHandle<()>,
}

#[derive(Debug)]
struct MockState {
    permission: PermissionState,
    adapter_open: bool,
    failures: HashMap<Operation, FailureRule>,
    calls: Vec<Operation>,
    sessions: VecDeque<Session>,
    default_session: Session,
    discovery: Option<ActiveDiscovery>,
    connected: HashSet<TransportAddress>,
    pending_service_polls: u32,
    services: Vec<Uuid>,
    characteristics: Vec<CharacteristicInfo>,
    writes: Vec<(TransportAddress, Bytes)>,
}

impl MockState {
    fn new() -> Self {
        Self {
            permission: PermissionState::Granted,
            adapter_open: false,
            failures: HashMap::new(),
            calls: Vec::new(),
            sessions: VecDeque::new(),
            default_session: Vec::new(),
            discovery: None,
            connected: HashSet::new(),
            pending_service_polls: 0,
            services: vec![CONTROL_SERVICE_UUID],
            characteristics: vec![CharacteristicInfo::new(WRITE_CHARACTERISTIC_UUID, true)],
            writes: Vec::new(),
        }
    }

    /// Record a call and apply any scripted failure.
    fn enter(&mut self, operation: Operation) -> Result<()> {
        self.calls.push(operation);

        match self.failures.get_mut(&operation) {
            Some(rule) if rule.succeed_first > 0 => {
                rule.succeed_first -= 1;
                Ok(())
            }
            Some(rule) => Err(BleError::platform(rule.code, rule.message.clone())),
            None => Ok(()),
        }
    }

    fn require_connection(&self, address: &TransportAddress) -> Result<()> {
        if self.connected.contains(address) {
            Ok(())
        } else {
            Err(BleError::platform(ERR_NO_CONNECTION, "no connection"))
        }
    }

    fn stop_feeder(&mut self) {
        if let Some(active) = self.discovery.take() {
            active.feeder.abort();
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockState>,
    events: broadcast::Sender<ConnectionStateChange>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, address: &TransportAddress, connected: bool) {
        // No subscribers is fine.
        let _ = self.events.send(ConnectionStateChange {
            address: address.clone(),
            connected,
        });
    }
}

/// Mock BLE platform for testing and development.
///
/// # Examples
///
/// ```
/// use cellar_ble::mock::{MockPlatform, Operation, StatusPayload};
/// use cellar_ble::{BlePlatform, DiscoveryOptions, ScanRecord};
/// use cellar_core::TransportAddress;
///
/// #[tokio::main]
/// async fn main() -> cellar_ble::Result<()> {
///     let (platform, handle) = MockPlatform::new();
///     platform.open_adapter().await?;
///
///     let address = TransportAddress::new("AA:BB:CC:DD:EE:01").unwrap();
///     let payload = StatusPayload::new(12345).status(1).build();
///     handle.advertise(vec![vec![ScanRecord::new(address, -50, payload)]]);
///
///     let mut batches = platform.start_discovery(DiscoveryOptions::default()).await?;
///     let batch = batches.recv().await.unwrap();
///     assert_eq!(batch.len(), 1);
///
///     platform.stop_discovery();
///     assert_eq!(handle.call_count(Operation::StartDiscovery), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockPlatform {
    shared: Arc<Shared>,
}

impl MockPlatform {
    /// Create a new mock platform.
    ///
    /// Returns a tuple of (MockPlatform, MockPlatformHandle) where the handle
    /// scripts the platform's behavior. Permission starts granted and the
    /// GATT table exposes the control service with its write characteristic.
    pub fn new() -> (Self, MockPlatformHandle) {
        let (events, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            state: Mutex::new(MockState::new()),
            events,
        });

        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockPlatformHandle { shared },
        )
    }
}

impl BlePlatform for MockPlatform {
    async fn permission_state(&self) -> Result<PermissionState> {
        let mut state = self.shared.lock();
        state.enter(Operation::PermissionState)?;
        Ok(state.permission)
    }

    async fn request_permission(&self) -> Result<()> {
        self.shared.lock().enter(Operation::RequestPermission)
    }

    async fn open_permission_settings(&self) -> Result<()> {
        self.shared.lock().enter(Operation::OpenPermissionSettings)
    }

    async fn open_adapter(&self) -> Result<()> {
        let mut state = self.shared.lock();
        state.enter(Operation::OpenAdapter)?;
        state.adapter_open = true;
        Ok(())
    }

    async fn close_adapter(&self) -> Result<()> {
        let mut state = self.shared.lock();
        state.enter(Operation::CloseAdapter)?;
        state.adapter_open = false;
        state.stop_feeder();
        Ok(())
    }

    async fn start_discovery(
        &self,
        options: DiscoveryOptions,
    ) -> Result<mpsc::Receiver<Vec<ScanRecord>>> {
        let mut state = self.shared.lock();
        state.enter(Operation::StartDiscovery)?;
        if !state.adapter_open {
            return Err(BleError::platform(ERR_ADAPTER_UNAVAILABLE, "adapter not open"));
        }
        state.stop_feeder();

        let session = match state.sessions.pop_front() {
            Some(session) => session,
            None => state.default_session.clone(),
        };

        let (sender, receiver) = mpsc::channel(64);
        let feeder_sender = sender.clone();
        let feeder = tokio::spawn(async move {
            for batch in session {
                tokio::time::sleep(options.interval).await;
                if feeder_sender.send(batch).await.is_err() {
                    break;
                }
            }
        });

        state.discovery = Some(ActiveDiscovery {
            _sender: sender,
            feeder,
        });
        Ok(receiver)
    }

    fn stop_discovery(&self) {
        let mut state = self.shared.lock();
        // Stopping never fails from the caller's point of view.
        let _ = state.enter(Operation::StopDiscovery);
        state.stop_feeder();
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionStateChange> {
        self.shared.events.subscribe()
    }

    async fn connect(&self, address: &TransportAddress) -> Result<()> {
        {
            let mut state = self.shared.lock();
            state.enter(Operation::Connect)?;
            state.connected.insert(address.clone());
        }
        self.shared.emit(address, true);
        Ok(())
    }

    async fn disconnect(&self, address: &TransportAddress) -> Result<()> {
        let was_connected = {
            let mut state = self.shared.lock();
            state.enter(Operation::Disconnect)?;
            state.connected.remove(address)
        };
        if was_connected {
            self.shared.emit(address, false);
        }
        Ok(())
    }

    async fn services(&self, address: &TransportAddress) -> Result<Vec<Uuid>> {
        let mut state = self.shared.lock();
        state.enter(Operation::Services)?;
        state.require_connection(address)?;

        if state.pending_service_polls > 0 {
            state.pending_service_polls -= 1;
            return Ok(Vec::new());
        }
        Ok(state.services.clone())
    }

    async fn characteristics(
        &self,
        address: &TransportAddress,
        service: Uuid,
    ) -> Result<Vec<CharacteristicInfo>> {
        let mut state = self.shared.lock();
        state.enter(Operation::Characteristics)?;
        state.require_connection(address)?;

        if state.services.contains(&service) {
            Ok(state.characteristics.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn write(
        &self,
        address: &TransportAddress,
        _service: Uuid,
        _characteristic: Uuid,
        data: Bytes,
    ) -> Result<()> {
        let mut state = self.shared.lock();
        state.enter(Operation::Write)?;
        state.require_connection(address)?;
        state.writes.push((address.clone(), data));
        Ok(())
    }
}

/// Handle for scripting a [`MockPlatform`].
#[derive(Debug, Clone)]
pub struct MockPlatformHandle {
    shared: Arc<Shared>,
}

impl MockPlatformHandle {
    /// Set the permission state reported by the platform.
    pub fn set_permission(&self, permission: PermissionState) {
        self.shared.lock().permission = permission;
    }

    /// Make every call to `operation` fail with the given platform error.
    pub fn fail(&self, operation: Operation, code: i32, message: impl Into<String>) {
        self.fail_after(operation, 0, code, message);
    }

    /// Let `successes` calls to `operation` succeed, then fail every later one.
    pub fn fail_after(
        &self,
        operation: Operation,
        successes: u32,
        code: i32,
        message: impl Into<String>,
    ) {
        self.shared.lock().failures.insert(
            operation,
            FailureRule {
                succeed_first: successes,
                code,
                message: message.into(),
            },
        );
    }

    /// Remove a scripted failure.
    pub fn clear_failure(&self, operation: Operation) {
        self.shared.lock().failures.remove(&operation);
    }

    /// Batches replayed by every discovery session without a queued script.
    pub fn advertise(&self, batches: Vec<Vec<ScanRecord>>) {
        self.shared.lock().default_session = batches;
    }

    /// Batches replayed by the next discovery session only.
    pub fn queue_session(&self, batches: Vec<Vec<ScanRecord>>) {
        self.shared.lock().sessions.push_back(batches);
    }

    /// Report an empty service list for the next `polls` service queries.
    pub fn delay_services(&self, polls: u32) {
        self.shared.lock().pending_service_polls = polls;
    }

    /// Replace the advertised GATT services.
    pub fn set_services(&self, services: Vec<Uuid>) {
        self.shared.lock().services = services;
    }

    /// Replace the characteristics of every known service.
    pub fn set_characteristics(&self, characteristics: Vec<CharacteristicInfo>) {
        self.shared.lock().characteristics = characteristics;
    }

    /// Simulate a link loss reported by the stack.
    pub fn drop_connection(&self, address: &TransportAddress) {
        let removed = self.shared.lock().connected.remove(address);
        if removed {
            self.shared.emit(address, false);
        }
    }

    /// Emit a raw connection state event without changing platform state.
    pub fn emit_state_change(&self, address: &TransportAddress, connected: bool) {
        self.shared.emit(address, connected);
    }

    /// All recorded calls in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.shared.lock().calls.clone()
    }

    /// Number of recorded calls to `operation`.
    pub fn call_count(&self, operation: Operation) -> usize {
        self.shared
            .lock()
            .calls
            .iter()
            .filter(|&&call| call == operation)
            .count()
    }

    /// Frames written so far, in order.
    pub fn writes(&self) -> Vec<(TransportAddress, Bytes)> {
        self.shared.lock().writes.clone()
    }

    /// Whether the platform holds a link to `address`.
    pub fn is_connected(&self, address: &TransportAddress) -> bool {
        self.shared.lock().connected.contains(address)
    }

    /// Whether the adapter is open.
    pub fn adapter_open(&self) -> bool {
        self.shared.lock().adapter_open
    }

    /// Whether a discovery session is running.
    pub fn discovery_active(&self) -> bool {
        self.shared.lock().discovery.is_some()
    }
}
