//! Periodic liveness monitoring.
//!
//! Each monitored device runs its own tokio task. A tick first tries the
//! cheap path, a one-byte probe over an open link, and falls back to a
//! short silent scan when there is no link or the probe fails:
//!
//! ```text
//! tick
//!  ├─ open link tagged with the device id?
//!  │     └─ write probe ──ok──> Online
//!  │            └─ err: mark disconnected ─┐
//!  └───────────────────────────────────────┴─> silent scan
//!                                                 ├─ found ──> Online
//!                                                 └─ else ───> Offline
//! ```
//!
//! The probe path only uses a link the [`ConnectionManager`] currently
//! holds for the device. A scan hit is not remembered: the next tick starts
//! from the link table again.
//!
//! Every tick yields exactly one status. Errors never escape a task.

use crate::config::{HeartbeatConfig, ScanConfig};
use crate::writer::CommandWriter;
use cellar_ble::{BlePlatform, ConnectionManager, ScanOutcome, Scanner};
use cellar_core::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Liveness of a monitored device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatStatus {
    Online,
    Offline,
}

impl fmt::Display for HeartbeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeartbeatStatus::Online => f.write_str("online"),
            HeartbeatStatus::Offline => f.write_str("offline"),
        }
    }
}

/// Callback receiving one status per tick.
pub type HeartbeatCallback = Arc<dyn Fn(HeartbeatStatus) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Probe<P: BlePlatform> {
    scanner: Arc<Scanner<P>>,
    connections: Arc<ConnectionManager<P>>,
    writer: CommandWriter<P>,
    scan_config: ScanConfig,
    scan_timeout_ms: u64,
    statuses: Mutex<HashMap<DeviceId, HeartbeatStatus>>,
}

impl<P: BlePlatform> Probe<P> {
    async fn tick(&self, device_id: DeviceId) -> HeartbeatStatus {
        if let Some(address) = self.connections.device_address(device_id) {
            match self.writer.write_probe(&address).await {
                Ok(()) => {
                    trace!(%device_id, %address, "Heartbeat probe written");
                    return HeartbeatStatus::Online;
                }
                Err(e) => {
                    debug!(
                        %device_id,
                        %address,
                        error = %e,
                        "Heartbeat probe failed, scanning"
                    );
                    self.connections.mark_disconnected(&address);
                }
            }
        }

        self.scan(device_id).await
    }

    async fn scan(&self, device_id: DeviceId) -> HeartbeatStatus {
        let request = self
            .scan_config
            .request(device_id, self.scan_timeout_ms)
            .silent(true);

        match self.scanner.scan(request).await {
            Ok(ScanOutcome::Found(hit)) => {
                trace!(%device_id, address = %hit.address, "Heartbeat scan hit");
                HeartbeatStatus::Online
            }
            Ok(ScanOutcome::NotFound { .. }) => HeartbeatStatus::Offline,
            Err(e) => {
                debug!(%device_id, error = %e, "Heartbeat scan failed");
                HeartbeatStatus::Offline
            }
        }
    }
}

/// Per-device heartbeat scheduler.
///
/// Dropping the monitor aborts every running heartbeat.
pub struct HeartbeatMonitor<P: BlePlatform> {
    probe: Arc<Probe<P>>,
    default_interval: Duration,
    tasks: Mutex<HashMap<DeviceId, JoinHandle<()>>>,
}

impl<P: BlePlatform> HeartbeatMonitor<P> {
    pub fn new(
        scanner: Arc<Scanner<P>>,
        connections: Arc<ConnectionManager<P>>,
        scan_config: &ScanConfig,
        config: &HeartbeatConfig,
    ) -> Self {
        let writer = CommandWriter::new(Arc::clone(scanner.platform()));
        Self {
            probe: Arc::new(Probe {
                scanner,
                connections,
                writer,
                scan_config: scan_config.clone(),
                scan_timeout_ms: config.scan_timeout_ms,
                statuses: Mutex::new(HashMap::new()),
            }),
            default_interval: Duration::from_millis(config.interval_ms),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start monitoring `device_id`, replacing any heartbeat already running
    /// for it.
    ///
    /// The first tick fires one `interval` after the call. `None` uses the
    /// configured default interval.
    pub fn start(
        &self,
        device_id: DeviceId,
        callback: impl Fn(HeartbeatStatus) + Send + Sync + 'static,
        interval: Option<Duration>,
    ) {
        let interval = interval
            .unwrap_or(self.default_interval)
            .max(Duration::from_millis(1));
        let callback: HeartbeatCallback = Arc::new(callback);
        let probe = Arc::clone(&self.probe);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let status = probe.tick(device_id).await;
                lock(&probe.statuses).insert(device_id, status);
                debug!(%device_id, %status, "Heartbeat");
                callback(status);
            }
        });

        if let Some(previous) = lock(&self.tasks).insert(device_id, task) {
            previous.abort();
            debug!(%device_id, "Heartbeat replaced");
        } else {
            let interval_ms = interval.as_millis() as u64;
            info!(%device_id, interval_ms, "Heartbeat started");
        }
    }

    /// Stop monitoring `device_id`.
    ///
    /// Returns `false` if no heartbeat was running. The last status stays
    /// readable.
    pub fn stop(&self, device_id: DeviceId) -> bool {
        match lock(&self.tasks).remove(&device_id) {
            Some(task) => {
                task.abort();
                info!(%device_id, "Heartbeat stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let tasks: Vec<_> = lock(&self.tasks).drain().collect();
        for (_, task) in &tasks {
            task.abort();
        }
        if !tasks.is_empty() {
            info!(count = tasks.len(), "All heartbeats stopped");
        }
    }

    pub fn is_running(&self, device_id: DeviceId) -> bool {
        lock(&self.tasks)
            .get(&device_id)
            .is_some_and(|task| !task.is_finished())
    }

    /// Devices with a running heartbeat.
    pub fn running(&self) -> Vec<DeviceId> {
        lock(&self.tasks).keys().copied().collect()
    }

    /// Status reported by the most recent tick.
    pub fn last_status(&self, device_id: DeviceId) -> Option<HeartbeatStatus> {
        lock(&self.probe.statuses).get(&device_id).copied()
    }

    /// Run a single tick now, outside the schedule.
    pub async fn check_now(&self, device_id: DeviceId) -> HeartbeatStatus {
        let status = self.probe.tick(device_id).await;
        lock(&self.probe.statuses).insert(device_id, status);
        status
    }
}

impl<P: BlePlatform> Drop for HeartbeatMonitor<P> {
    fn drop(&mut self) {
        for (_, task) in lock(&self.tasks).drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_ble::ScanRecord;
    use cellar_ble::mock::{
        MockPlatform, MockPlatformHandle, Operation, StatusPayload, foreign_payload,
    };
    use cellar_core::TransportAddress;

    type Fixture = (
        HeartbeatMonitor<MockPlatform>,
        MockPlatformHandle,
        Arc<ConnectionManager<MockPlatform>>,
    );

    fn device(id: u32) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    fn address() -> TransportAddress {
        TransportAddress::new("C0:FF:EE:00:00:01").unwrap()
    }

    fn monitor_with(scan: &ScanConfig) -> Fixture {
        let (platform, handle) = MockPlatform::new();
        let platform = Arc::new(platform);
        let scanner = Arc::new(Scanner::new(Arc::clone(&platform)));
        let connections = Arc::new(ConnectionManager::new(platform));
        let monitor = HeartbeatMonitor::new(
            scanner,
            Arc::clone(&connections),
            scan,
            &HeartbeatConfig::default(),
        );
        (monitor, handle, connections)
    }

    fn monitor() -> Fixture {
        monitor_with(&ScanConfig::default())
    }

    fn sighting(id: u32) -> ScanRecord {
        ScanRecord::new(address(), -60, StatusPayload::new(id).build())
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_path_when_connected() {
        let (monitor, handle, connections) = monitor();
        connections
            .connect_device(device(7), &address())
            .await
            .unwrap();

        assert_eq!(monitor.check_now(device(7)).await, HeartbeatStatus::Online);
        assert_eq!(handle.writes()[0].1.as_ref(), &[0xFF]);
        assert_eq!(handle.call_count(Operation::StartDiscovery), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untagged_link_is_not_written() {
        let (monitor, handle, connections) = monitor();
        connections.connect(&address()).await.unwrap();

        assert_eq!(monitor.check_now(device(7)).await, HeartbeatStatus::Offline);
        assert!(handle.writes().is_empty());
        assert_eq!(handle.call_count(Operation::StartDiscovery), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_falls_back_to_scan() {
        let (monitor, handle, connections) = monitor();
        connections
            .connect_device(device(7), &address())
            .await
            .unwrap();
        handle.fail(Operation::Write, 10006, "link lost");
        handle.advertise(vec![vec![sighting(7)]]);

        assert_eq!(monitor.check_now(device(7)).await, HeartbeatStatus::Online);
        assert!(!connections.is_connected(&address()));
        assert_eq!(handle.call_count(Operation::StartDiscovery), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adapter_failure_is_offline() {
        let (monitor, handle, _connections) = monitor();
        handle.fail(Operation::OpenAdapter, 10001, "adapter off");

        assert_eq!(monitor.check_now(device(9)).await, HeartbeatStatus::Offline);
        assert_eq!(monitor.last_status(device(9)), Some(HeartbeatStatus::Offline));
        assert_eq!(handle.call_count(Operation::StartDiscovery), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_hit_is_not_remembered() {
        let (monitor, handle, connections) = monitor();
        handle.queue_session(vec![vec![sighting(3)]]);

        assert_eq!(monitor.check_now(device(3)).await, HeartbeatStatus::Online);
        assert_eq!(connections.device_address(device(3)), None);

        // The device has gone quiet and no link is held, so nothing is written.
        assert_eq!(monitor.check_now(device(3)).await, HeartbeatStatus::Offline);
        assert!(handle.writes().is_empty());
        assert_eq!(handle.call_count(Operation::StartDiscovery), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_link_falls_back_to_scan() {
        let (monitor, handle, connections) = monitor();
        connections
            .connect_device(device(5), &address())
            .await
            .unwrap();
        connections.mark_disconnected(&address());

        assert_eq!(monitor.check_now(device(5)).await, HeartbeatStatus::Offline);
        assert!(handle.writes().is_empty());
        assert_eq!(handle.call_count(Operation::StartDiscovery), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_uses_configured_callback_cap() {
        let scan = ScanConfig {
            max_callbacks: 2,
            ..ScanConfig::default()
        };
        let (monitor, handle, _connections) = monitor_with(&scan);
        let noise = ScanRecord::new(address(), -80, foreign_payload());
        handle.queue_session((0..20).map(|_| vec![noise.clone()]).collect());

        let started = Instant::now();
        assert_eq!(monitor.check_now(device(6)).await, HeartbeatStatus::Offline);

        let window = Duration::from_millis(HeartbeatConfig::default().scan_timeout_ms);
        assert!(started.elapsed() < window);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_replaces_and_stop() {
        let (monitor, _handle, _connections) = monitor();

        monitor.start(device(1), |_| {}, Some(Duration::from_secs(5)));
        monitor.start(device(1), |_| {}, Some(Duration::from_secs(5)));
        assert_eq!(monitor.running(), vec![device(1)]);
        assert!(monitor.is_running(device(1)));

        assert!(monitor.stop(device(1)));
        assert!(!monitor.stop(device(1)));
        assert!(!monitor.is_running(device(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_interval() {
        let (monitor, _handle, _connections) = monitor();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let started = Instant::now();
        monitor.start(
            device(4),
            move |status| {
                let _ = tx.send((Instant::now(), status));
            },
            Some(Duration::from_secs(10)),
        );

        let (at, status) = rx.recv().await.unwrap();
        assert_eq!(status, HeartbeatStatus::Offline);
        // One interval, then the full 3 s scan window.
        assert!(at.duration_since(started) >= Duration::from_secs(13));
        monitor.stop_all();
    }
}
