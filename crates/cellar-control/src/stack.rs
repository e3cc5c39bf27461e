//! Composition root.
//!
//! A [`ControlStack`] builds the shared components once and hands out
//! references, so every piece of the app sees the same scanner (and with it
//! the same adapter lease count), the same connection table and the same
//! heartbeats.

use crate::config::CellarConfig;
use crate::controller::{CommandSource, DeviceController, ResultReporter};
use crate::heartbeat::HeartbeatMonitor;
use crate::probe::StatusProbe;
use crate::protocol::ControlProtocol;
use cellar_ble::{BlePlatform, ConnectionManager, Scanner};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Shared control components over one platform.
///
/// Must be created inside a tokio runtime. Dropping the stack stops the
/// connection listener and every heartbeat.
pub struct ControlStack<P: BlePlatform> {
    config: CellarConfig,
    platform: Arc<P>,
    scanner: Arc<Scanner<P>>,
    connections: Arc<ConnectionManager<P>>,
    protocol: Arc<ControlProtocol<P>>,
    heartbeat: HeartbeatMonitor<P>,
    probe: StatusProbe<P>,
    listener: JoinHandle<()>,
}

impl<P: BlePlatform> ControlStack<P> {
    pub fn new(platform: P, config: CellarConfig) -> Self {
        let platform = Arc::new(platform);
        let scanner = Arc::new(Scanner::new(Arc::clone(&platform)));
        let connections = Arc::new(ConnectionManager::new(Arc::clone(&platform)));
        let listener = connections.spawn_listener();

        let protocol = Arc::new(ControlProtocol::new(
            Arc::clone(&scanner),
            Arc::clone(&connections),
            config.scan.clone(),
            config.protocol.clone(),
        ));
        let heartbeat = HeartbeatMonitor::new(
            Arc::clone(&scanner),
            Arc::clone(&connections),
            &config.scan,
            &config.heartbeat,
        );
        let probe = StatusProbe::new(
            Arc::clone(&scanner),
            config.scan.clone(),
            config.probe.clone(),
        );

        debug!("Control stack ready");
        Self {
            config,
            platform,
            scanner,
            connections,
            protocol,
            heartbeat,
            probe,
            listener,
        }
    }

    pub fn config(&self) -> &CellarConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    pub fn scanner(&self) -> &Arc<Scanner<P>> {
        &self.scanner
    }

    pub fn connections(&self) -> &Arc<ConnectionManager<P>> {
        &self.connections
    }

    pub fn protocol(&self) -> &Arc<ControlProtocol<P>> {
        &self.protocol
    }

    pub fn heartbeat(&self) -> &HeartbeatMonitor<P> {
        &self.heartbeat
    }

    pub fn probe(&self) -> &StatusProbe<P> {
        &self.probe
    }

    /// Controller delivering commands from `source` and reporting to
    /// `reporter` through this stack's protocol.
    pub fn controller<S, R>(&self, source: S, reporter: R) -> DeviceController<P, S, R>
    where
        S: CommandSource,
        R: ResultReporter,
    {
        DeviceController::new(Arc::clone(&self.protocol), source, reporter)
    }

    /// Stop heartbeats and close every open link.
    pub async fn shutdown(&self) {
        self.heartbeat.stop_all();
        self.connections.disconnect_all().await;
        self.listener.abort();
        debug!("Control stack shut down");
    }
}

impl<P: BlePlatform> Drop for ControlStack<P> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
