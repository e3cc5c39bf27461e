//! The control protocol: one command, one device, one verified write.
//!
//! [`ControlProtocol::execute`] drives a [`StateMachine`] through the full
//! sequence:
//!
//! ```text
//! validate command ─┐
//!                   ├─ CheckingPermission      (if required)
//!                   ├─ OpeningAdapter
//!                   ├─ Scanning                status seen here is the baseline
//!                   ├─ Connecting
//!                   ├─ DiscoveringServices     bounded async polling
//!                   ├─ DiscoveringCharacteristics
//!                   ├─ Writing                 frames in order, first failure aborts
//!                   ├─ VerifyingStatus         silent scan for a status != baseline
//!                   └─ Success | Failed        link closed, adapter lease released
//! ```
//!
//! The command is validated before anything else runs, so a malformed
//! command never reaches the radio. A run is never retried automatically.
//!
//! The adapter is held through an [`AdapterLease`] from `OpeningAdapter`
//! until cleanup. Scans started by other components meanwhile share the
//! open adapter, and it is closed only once the last lease is released.
//!
//! Verification outcomes do not change the success of a run: once every
//! frame is written the command was delivered, and [`Verification`] only
//! refines the message shown to the user.

use crate::config::{ProtocolConfig, ScanConfig};
use crate::error::{ControlError, Result};
use crate::permission::ensure_permission;
use crate::state::{ControlState, StateMachine, StateTransition};
use crate::writer::CommandWriter;
use cellar_ble::{AdapterLease, BlePlatform, ConnectionManager, ScanOutcome, Scanner};
use cellar_core::{
    DeviceId, StatusCode, TransportAddress,
    constants::{CONTROL_SERVICE_UUID, WRITE_CHARACTERISTIC_UUID},
};
use cellar_protocol::ControlCommand;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What the post-write scan observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum Verification {
    /// The device reported a status different from the baseline.
    Confirmed(StatusCode),
    /// The device was seen, still in its baseline status.
    Unchanged(StatusCode),
    /// The device was not observed during the verification window.
    Unconfirmed,
    /// Verification is disabled.
    Skipped,
}

impl Verification {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Confirmed(_) => "Control command executed",
            Self::Unchanged(_) => "Command sent, but the device may not have started",
            Self::Unconfirmed => "Command sent, device status unconfirmed",
            Self::Skipped => "Control command sent",
        }
    }
}

/// How a control run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Success(Verification),
    Failed {
        /// State the run was in when it failed.
        state: ControlState,
        error: ControlError,
    },
}

/// Result of one control invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReport {
    pub device_id: DeviceId,
    pub outcome: ControlOutcome,
    pub transitions: Vec<StateTransition>,
}

impl ControlReport {
    /// Report for a run that failed before the state machine started.
    pub fn rejected(device_id: DeviceId, error: ControlError) -> Self {
        Self {
            device_id,
            outcome: ControlOutcome::Failed {
                state: ControlState::Idle,
                error,
            },
            transitions: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.outcome, ControlOutcome::Success(_))
    }

    /// Message for the end user.
    pub fn message(&self) -> String {
        match &self.outcome {
            ControlOutcome::Success(verification) => verification.message().to_string(),
            ControlOutcome::Failed { error, .. } => error.user_message(),
        }
    }

    pub fn verification(&self) -> Option<Verification> {
        match self.outcome {
            ControlOutcome::Success(verification) => Some(verification),
            ControlOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ControlError> {
        match &self.outcome {
            ControlOutcome::Success(_) => None,
            ControlOutcome::Failed { error, .. } => Some(error),
        }
    }

    /// States visited, in order, ending with the terminal state.
    pub fn states(&self) -> Vec<ControlState> {
        self.transitions.iter().map(|t| t.to).collect()
    }
}

/// Resources acquired by a run, released on every exit path.
struct Acquired<P: BlePlatform> {
    adapter: Option<AdapterLease<P>>,
    link: Option<TransportAddress>,
}

impl<P: BlePlatform> Acquired<P> {
    fn new() -> Self {
        Self {
            adapter: None,
            link: None,
        }
    }
}

/// Executes control commands against vending devices.
pub struct ControlProtocol<P: BlePlatform> {
    platform: Arc<P>,
    scanner: Arc<Scanner<P>>,
    connections: Arc<ConnectionManager<P>>,
    writer: CommandWriter<P>,
    scan_config: ScanConfig,
    config: ProtocolConfig,
}

impl<P: BlePlatform> ControlProtocol<P> {
    pub fn new(
        scanner: Arc<Scanner<P>>,
        connections: Arc<ConnectionManager<P>>,
        scan_config: ScanConfig,
        config: ProtocolConfig,
    ) -> Self {
        let platform = Arc::clone(scanner.platform());
        Self {
            writer: CommandWriter::new(Arc::clone(&platform)),
            platform,
            scanner,
            connections,
            scan_config,
            config,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Deliver `command` to `device_id`.
    ///
    /// Never returns an error: failures are reported in the
    /// [`ControlReport`] together with the state they happened in.
    pub async fn execute(&self, device_id: DeviceId, command: &str) -> ControlReport {
        let mut machine = StateMachine::new();
        let mut acquired = Acquired::new();

        let result = self
            .run(&mut machine, &mut acquired, device_id, command)
            .await;

        let outcome = match result {
            Ok(verification) => {
                info!(%device_id, ?verification, "Control succeeded");
                ControlOutcome::Success(verification)
            }
            Err(error) => {
                let state = *machine.current_state();
                warn!(%device_id, %state, error = %error, "Control failed");
                machine.fail();
                ControlOutcome::Failed { state, error }
            }
        };

        self.release(acquired).await;

        ControlReport {
            device_id,
            outcome,
            transitions: machine.into_history(),
        }
    }

    async fn run(
        &self,
        machine: &mut StateMachine,
        acquired: &mut Acquired<P>,
        device_id: DeviceId,
        command: &str,
    ) -> Result<Verification> {
        let command = ControlCommand::new(command)?;
        debug!(%device_id, bytes = command.len(), "Command validated");

        if self.config.require_permission {
            machine.transition_to(ControlState::CheckingPermission)?;
            ensure_permission(self.platform.as_ref()).await?;
        }

        machine.transition_to(ControlState::OpeningAdapter)?;
        acquired.adapter = Some(self.scanner.adapter().acquire().await?);

        machine.transition_to(ControlState::Scanning)?;
        let request = self
            .scan_config
            .request(device_id, self.config.scan_timeout_ms);
        let hit = match self.scanner.scan(request).await? {
            ScanOutcome::Found(hit) => hit,
            ScanOutcome::NotFound {
                reason, callbacks, ..
            } => {
                return Err(ControlError::DeviceNotFound {
                    device_id,
                    reason,
                    callbacks,
                });
            }
        };
        let baseline = hit.status.status;
        let address = hit.address;

        machine.transition_to(ControlState::Connecting)?;
        self.connections.connect_device(device_id, &address).await?;
        acquired.link = Some(address.clone());

        machine.transition_to(ControlState::DiscoveringServices)?;
        self.await_control_service(&address).await?;

        machine.transition_to(ControlState::DiscoveringCharacteristics)?;
        self.find_write_characteristic(&address).await?;

        machine.transition_to(ControlState::Writing)?;
        self.writer
            .write_frames(
                &address,
                &command.frames(),
                Duration::from_millis(self.config.frame_gap_ms),
            )
            .await?;

        if !self.config.verify {
            machine.transition_to(ControlState::Success)?;
            return Ok(Verification::Skipped);
        }

        machine.transition_to(ControlState::VerifyingStatus)?;
        let verification = self.verify(device_id, baseline).await;
        machine.transition_to(ControlState::Success)?;
        Ok(verification)
    }

    /// Poll the service list until the control service shows up.
    async fn await_control_service(&self, address: &TransportAddress) -> Result<()> {
        let timeout_ms = self.config.service_discovery_timeout_ms;
        let spacing = Duration::from_millis(self.config.service_retry_interval_ms);
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let services = self.platform.services(address).await?;
            if services.contains(&CONTROL_SERVICE_UUID) {
                debug!(%address, attempts, "Control service discovered");
                return Ok(());
            }

            if Instant::now() + spacing > deadline {
                warn!(%address, attempts, timeout_ms, "Control service not discovered");
                return Err(ControlError::ServiceDiscoveryTimeout { timeout_ms });
            }
            tokio::time::sleep(spacing).await;
        }
    }

    async fn find_write_characteristic(&self, address: &TransportAddress) -> Result<()> {
        let characteristics = self
            .platform
            .characteristics(address, CONTROL_SERVICE_UUID)
            .await?;

        if characteristics
            .iter()
            .any(|c| c.uuid == WRITE_CHARACTERISTIC_UUID && c.writable)
        {
            Ok(())
        } else {
            Err(ControlError::CharacteristicNotFound)
        }
    }

    /// Watch for a status different from `baseline`.
    async fn verify(&self, device_id: DeviceId, baseline: StatusCode) -> Verification {
        tokio::time::sleep(Duration::from_millis(self.config.verify_settle_ms)).await;

        let request = self
            .scan_config
            .request(device_id, self.config.verify_timeout_ms)
            .poll_interval(Duration::from_millis(self.config.verify_poll_interval_ms))
            .max_callbacks(self.config.verify_max_callbacks)
            .silent(true)
            .accept_if(move |status| status.status != baseline);

        match self.scanner.scan(request).await {
            Ok(ScanOutcome::Found(hit)) => Verification::Confirmed(hit.status.status),
            Ok(ScanOutcome::NotFound {
                last_seen: Some(hit),
                ..
            }) => Verification::Unchanged(hit.status.status),
            Ok(ScanOutcome::NotFound { .. }) => Verification::Unconfirmed,
            Err(e) => {
                debug!(%device_id, error = %e, "Verification scan failed to start");
                Verification::Unconfirmed
            }
        }
    }

    async fn release(&self, acquired: Acquired<P>) {
        if let Some(address) = acquired.link
            && let Err(e) = self.connections.disconnect(&address).await
        {
            debug!(%address, error = %e, "Disconnect during cleanup failed");
        }

        if let Some(lease) = acquired.adapter
            && let Err(e) = lease.release().await
        {
            debug!(error = %e, "Closing adapter during cleanup failed");
        }
    }
}
