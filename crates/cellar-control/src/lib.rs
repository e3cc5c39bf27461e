//! Device control for BLE vending devices.
//!
//! This crate turns a backend-issued hex command into a verified action on a
//! nearby device, and keeps track of which devices are alive:
//!
//! - [`ControlProtocol`]: the scan, connect, write and verify cycle, driven
//!   by a [`StateMachine`]
//! - [`HeartbeatMonitor`]: periodic per-device liveness checks
//! - [`StatusProbe`]: one-shot online and detailed status checks
//! - [`DeviceController`]: fetches the command from a [`CommandSource`] and
//!   reports the result to a [`ResultReporter`]
//! - [`ControlStack`]: builds and shares all of the above over one platform
//!
//! Timing is configured through [`CellarConfig`]; [`diagnostics`] keeps the
//! recent log in memory.
//!
//! # Example
//!
//! ```
//! use cellar_ble::mock::{MockPlatform, StatusPayload};
//! use cellar_ble::ScanRecord;
//! use cellar_control::{CellarConfig, ControlStack};
//! use cellar_core::{DeviceId, TransportAddress};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (platform, handle) = MockPlatform::new();
//!     let address = TransportAddress::new("AA:BB:CC:DD:EE:01").unwrap();
//!     handle.advertise(vec![vec![ScanRecord::new(
//!         address,
//!         -50,
//!         StatusPayload::new(12345).build(),
//!     )]]);
//!
//!     let mut config = CellarConfig::default();
//!     config.protocol.verify = false;
//!     let stack = ControlStack::new(platform, config);
//!
//!     let report = stack
//!         .protocol()
//!         .execute(DeviceId::new(12345).unwrap(), "0102030405060708090A0B0C")
//!         .await;
//!     assert!(report.success());
//! }
//! ```

pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod heartbeat;
pub mod permission;
pub mod probe;
pub mod protocol;
pub mod stack;
pub mod state;
pub mod writer;

pub use config::{CellarConfig, HeartbeatConfig, ProbeConfig, ProtocolConfig, ScanConfig};
pub use controller::{
    CommandResponse, CommandSource, ControlRequest, DeviceController, ResultReport,
    ResultReporter,
};
pub use diagnostics::{DebugLog, LogEntry, init_tracing};
pub use error::{ControlError, Result};
pub use heartbeat::{HeartbeatCallback, HeartbeatMonitor, HeartbeatStatus};
pub use permission::ensure_permission;
pub use probe::{DetailedDeviceStatus, StatusProbe};
pub use protocol::{ControlOutcome, ControlProtocol, ControlReport, Verification};
pub use stack::ControlStack;
pub use state::{ControlState, StateMachine, StateTransition};
pub use writer::CommandWriter;
