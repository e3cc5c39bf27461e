//! BLE transport layer for vending devices.
//!
//! This crate wraps the host BLE stack behind the [`BlePlatform`] trait and
//! builds the shared radio components on top of it:
//!
//! - [`Adapter`]: reference-counted ownership of the host adapter
//! - [`Scanner`]: serialized, bounded discovery of one device by numeric id
//! - [`ConnectionManager`]: the per-address link table and link-loss callbacks
//!
//! # Design Philosophy
//!
//! - **Async-first**: platform operations return `Send` futures (Edition 2024
//!   RPITIT) so they can be driven from spawned tasks.
//! - **Generic, not dynamic**: components take `P: BlePlatform`; the trait is
//!   not object-safe.
//! - **Scoped resources**: discovery is stopped by a guard on every exit path.
//! - **Error-aware**: every error maps to an end-user message through
//!   [`BleError::user_message`].
//!
//! # Example
//!
//! ```
//! use cellar_ble::mock::{MockPlatform, StatusPayload};
//! use cellar_ble::{ScanRecord, ScanRequest, Scanner};
//! use cellar_core::{DeviceId, TransportAddress};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cellar_ble::Result<()> {
//!     let (platform, handle) = MockPlatform::new();
//!     let address = TransportAddress::new("AA:BB:CC:DD:EE:01").unwrap();
//!     handle.advertise(vec![vec![ScanRecord::new(
//!         address.clone(),
//!         -52,
//!         StatusPayload::new(12345).status(1).build(),
//!     )]]);
//!
//!     let scanner = Scanner::new(Arc::new(platform));
//!     let outcome = scanner
//!         .scan(ScanRequest::new(DeviceId::new(12345).unwrap()))
//!         .await?;
//!
//!     assert_eq!(outcome.hit().map(|hit| &hit.address), Some(&address));
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod connection;
pub mod error;
pub mod mock;
pub mod scanner;
pub mod traits;
pub mod types;

pub use adapter::{Adapter, AdapterLease};
pub use connection::{ConnectionManager, DisconnectCallback};
pub use error::{BleError, GENERIC_FAILURE_MESSAGE, Result, message_for_code};
pub use scanner::{
    AcceptFn, DiscoverySession, NotFoundReason, ProgressFn, ScanHit, ScanOutcome, ScanRequest,
    Scanner,
};
pub use traits::BlePlatform;
pub use types::{
    CharacteristicInfo, ConnectionStateChange, DiscoveryOptions, PermissionState, ScanRecord,
};
