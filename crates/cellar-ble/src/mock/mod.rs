//! Mock BLE stack for testing and development.
//!
//! This module provides a simulated platform that can be scripted
//! programmatically without a phone or a vending device.

pub mod payload;
pub mod platform;

pub use payload::{StatusPayload, foreign_payload};
pub use platform::{MockPlatform, MockPlatformHandle, Operation};
