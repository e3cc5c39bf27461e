//! Core constants for the vending-device BLE protocol.
//!
//! This module defines the protocol-level constants shared by the decoder,
//! the command framer and the control protocol. Values that are part of the
//! device firmware contract (byte offsets, vendor ids, service UUIDs) are
//! fixed; timing values are only defaults and every one of them can be
//! overridden through configuration.
//!
//! # Advertisement Layout
//!
//! A vending device broadcasts a fixed-layout manufacturer payload:
//!
//! ```text
//! 0    5      9    11      14        15         19       22       25       29
//! |PRE|..|VID(4)|...|ID(3)  |STATUS(1) |ORDER(4)  |REMAIN(3)|USED(3) |CHECK(4)|
//! ```
//!
//! When the numeric id is zero the bytes 14..22 carry an 8 character device
//! UUID instead of the status fields.
//!
//! # Usage
//!
//! ```
//! use cellar_core::constants::*;
//!
//! assert_eq!(MIN_ADVERTISEMENT_LEN, 29);
//! assert!(VENDOR_IDS.contains(&"002C"));
//!
//! use std::time::Duration;
//! let timeout = Duration::from_millis(DEFAULT_SCAN_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 8);
//! ```

use uuid::Uuid;

// ============================================================================
// Advertisement Layout
// ============================================================================

/// Minimum advertisement length the decoder accepts.
pub const MIN_ADVERTISEMENT_LEN: usize = 29;

/// Vendor identifiers of the supported device families.
///
/// Any other value at [`VENDOR_ID_OFFSET`] means the advertisement belongs to
/// an unrelated peripheral.
pub const VENDOR_IDS: [&str; 2] = ["002C", "003C"];

/// Offset of the single prefix character.
pub const PREFIX_OFFSET: usize = 0;

/// Offset of the 4-character vendor id.
pub const VENDOR_ID_OFFSET: usize = 5;

/// Offset of the 3-character "my vendor id" (overlaps the last vendor id byte).
pub const MY_VENDOR_ID_OFFSET: usize = 8;

/// Offset of the big-endian 24-bit device numeric id.
pub const DEVICE_ID_OFFSET: usize = 11;

/// Offset of the status code byte.
pub const STATUS_OFFSET: usize = 14;

/// Offset of the 8-character registration UUID (registration packets only).
pub const REGISTRATION_UUID_OFFSET: usize = 14;

/// Length of the registration UUID.
pub const REGISTRATION_UUID_LEN: usize = 8;

/// Offset of the big-endian 32-bit active order id.
pub const ORDER_ID_OFFSET: usize = 15;

/// Offset of the remaining-time / remaining-quantity triple.
pub const REMAINING_OFFSET: usize = 19;

/// Offset of the big-endian 24-bit used quantity.
pub const USED_QUANTITY_OFFSET: usize = 22;

/// Offset of the 4-byte embedded checksum.
pub const CHECKSUM_OFFSET: usize = 25;

/// High bit of the first remaining byte: set means the triple is a quantity.
pub const REMAINING_QUANTITY_FLAG: u8 = 0x80;

/// Remaining-time values at or above this threshold count whole days.
///
/// The encoded payload is `threshold + days`.
pub const DAY_ENCODING_THRESHOLD: u32 = 0x7F_0000;

/// Seconds in one day.
pub const SECONDS_PER_DAY: u32 = 86_400;

/// Legacy firmware reports `FF FF FF` when the remaining value is unknown.
pub const LEGACY_UNKNOWN_SENTINEL: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Largest numeric id that fits the 24-bit advertisement field.
pub const MAX_DEVICE_ID: u32 = 0xFF_FFFF;

// ============================================================================
// Command Framing
// ============================================================================

/// Maximum bytes written per characteristic write.
pub const FRAME_SIZE: usize = 20;

/// Hex characters consumed per full frame.
pub const FRAME_HEX_LEN: usize = FRAME_SIZE * 2;

/// Shortest control command (in hex characters) accepted from the backend.
pub const MIN_COMMAND_HEX_LEN: usize = 20;

/// Single-byte payload written as a liveness probe.
pub const HEARTBEAT_PROBE: u8 = 0xFF;

// ============================================================================
// GATT Layout
// ============================================================================

/// Primary service exposed by the vending device.
pub const CONTROL_SERVICE_UUID: Uuid = Uuid::from_u128(0x00000001_0000_1000_8000_00805F9B34FB);

/// Write characteristic under [`CONTROL_SERVICE_UUID`].
pub const WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00000003_0000_1000_8000_00805F9B34FB);

// ============================================================================
// Platform Error Codes
// ============================================================================

/// Adapter not available (radio off or unsupported).
pub const ERR_ADAPTER_UNAVAILABLE: i32 = 10001;

/// No device found.
pub const ERR_NO_DEVICE: i32 = 10002;

/// Connection attempt failed.
pub const ERR_CONNECTION_FAILED: i32 = 10003;

/// Connection dropped.
pub const ERR_NO_CONNECTION: i32 = 10006;

/// Characteristic read/write rejected.
pub const ERR_CHARACTERISTIC_FAILED: i32 = 10007;

/// System-level failure reported by the stack.
pub const ERR_SYSTEM: i32 = 10008;

/// Connection timed out.
pub const ERR_CONNECTION_TIMEOUT: i32 = 10012;

// ============================================================================
// Timing Defaults (milliseconds)
// ============================================================================

/// Advertisement poll interval requested from the platform.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Hard cap on discovery callbacks per scan.
pub const DEFAULT_MAX_CALLBACKS: u32 = 200;

/// Scan window for user-initiated control.
pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 8_000;

/// Overall deadline for service discovery.
pub const DEFAULT_SERVICE_DISCOVERY_TIMEOUT_MS: u64 = 10_000;

/// Spacing between service discovery attempts.
pub const DEFAULT_SERVICE_RETRY_INTERVAL_MS: u64 = 200;

/// Delay between the last frame and status verification.
pub const DEFAULT_VERIFY_SETTLE_MS: u64 = 2_000;

/// Verification scan window.
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 8_000;

/// Discovery callbacks inspected during verification.
pub const DEFAULT_VERIFY_MAX_CALLBACKS: u32 = 5;

/// Poll interval used by the verification scan.
pub const DEFAULT_VERIFY_POLL_INTERVAL_MS: u64 = 100;

/// Heartbeat tick interval.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Scan window of the heartbeat fallback probe.
pub const DEFAULT_HEARTBEAT_SCAN_TIMEOUT_MS: u64 = 3_000;

/// Silent online probe window.
pub const DEFAULT_SILENT_ONLINE_TIMEOUT_MS: u64 = 3_000;

/// Silent detailed probe window.
pub const DEFAULT_SILENT_DETAIL_TIMEOUT_MS: u64 = 5_000;

/// Interactive online probe window.
pub const DEFAULT_ONLINE_TIMEOUT_MS: u64 = 8_000;

/// Interactive detailed probe window.
pub const DEFAULT_DETAIL_TIMEOUT_MS: u64 = 10_000;
