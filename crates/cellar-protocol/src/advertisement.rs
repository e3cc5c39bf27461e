//! Vending-device advertisement decoder.
//!
//! Every vending device continuously broadcasts its state in a fixed-layout
//! advertisement payload. This module turns that payload into a
//! [`DeviceAdvertisement`] without connecting to the device.
//!
//! # Payload Layout
//!
//! ```text
//! offset  0      prefix character
//! offset  5..9   vendor id ("002C" or "003C")
//! offset  8..11  my-vendor id
//! offset 11..14  numeric device id (big-endian, 24 bit)
//! offset 14      status code           | 14..22 registration UUID (id == 0)
//! offset 15..19  active order id (32 bit)
//! offset 19..22  remaining time or remaining quantity
//! offset 22..25  used quantity (24 bit)
//! offset 25..29  checksum
//! ```
//!
//! # Remaining Triple
//!
//! - `FF FF FF`: legacy firmware, value unknown (both remaining fields are zero)
//! - high bit of byte 19 set: remaining quantity in the low 23 bits
//! - otherwise: remaining seconds; values at or above `0x7F0000` count days
//!
//! # Noise Handling
//!
//! Most advertisements a phone receives come from unrelated peripherals.
//! Decoding is total: any buffer that is too short or carries a foreign
//! vendor id yields `None`, never an error or a panic.
//!
//! # Examples
//!
//! ```
//! use cellar_protocol::advertisement::{AdvertisementDecoder, DeviceAdvertisement};
//!
//! let mut payload = [0u8; 29];
//! payload[5..9].copy_from_slice(b"002C");
//! payload[11..14].copy_from_slice(&[0x00, 0x30, 0x39]); // 12345
//! payload[14] = 1; // starting
//!
//! match AdvertisementDecoder::decode(&payload) {
//!     Some(DeviceAdvertisement::Status(status)) => {
//!         assert_eq!(status.device_id.as_u32(), 12345);
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//!
//! // Foreign peripherals are not devices.
//! assert!(AdvertisementDecoder::decode(&[0u8; 29]).is_none());
//! ```

use cellar_core::{DeviceId, StatusCode, constants::*};
use serde::{Deserialize, Serialize};

use crate::remaining::format_remaining;

/// A decoded advertisement from a recognized vending device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceAdvertisement {
    /// Unprovisioned device broadcasting its registration UUID.
    Registration(RegistrationRecord),

    /// Provisioned device broadcasting its operating status.
    Status(StatusRecord),
}

impl DeviceAdvertisement {
    /// The status record, if this is a status advertisement.
    pub fn as_status(&self) -> Option<&StatusRecord> {
        match self {
            Self::Status(status) => Some(status),
            Self::Registration(_) => None,
        }
    }

    /// The numeric device id, if this is a status advertisement.
    pub fn device_id(&self) -> Option<DeviceId> {
        self.as_status().map(|status| status.device_id)
    }

    /// Embedded checksum (lowercase hex).
    pub fn checksum(&self) -> &str {
        match self {
            Self::Registration(record) => &record.checksum,
            Self::Status(record) => &record.checksum,
        }
    }
}

/// Registration advertisement (numeric id zero).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub vendor_id: String,
    pub my_vendor_id: String,
    /// Raw numeric id field; zero for every registration packet.
    pub numeric_id: u32,
    /// 8-character device UUID used by the pairing flow.
    pub uuid: String,
    pub checksum: String,
}

/// What the remaining triple encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Remaining {
    /// Legacy `FF FF FF` sentinel.
    Unknown,
    /// Seconds left on the active order.
    Time(u64),
    /// Quantity left on the active order.
    Quantity(u32),
}

/// Status advertisement of a provisioned device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub prefix: char,
    pub vendor_id: String,
    pub my_vendor_id: String,
    pub device_id: DeviceId,
    pub status: StatusCode,
    pub order_id: u32,
    pub remaining: Remaining,
    pub used_quantity: u32,
    pub checksum: String,
}

impl StatusRecord {
    /// Remaining seconds, zero unless the triple encodes a time.
    pub fn remaining_time(&self) -> u64 {
        match self.remaining {
            Remaining::Time(seconds) => seconds,
            _ => 0,
        }
    }

    /// Remaining quantity, zero unless the triple encodes a quantity.
    pub fn remaining_quantity(&self) -> u32 {
        match self.remaining {
            Remaining::Quantity(quantity) => quantity,
            _ => 0,
        }
    }

    /// Remaining time rendered for display (empty when none).
    pub fn remaining_display(&self) -> String {
        format_remaining(self.remaining_time())
    }

    /// Whether the device reports an order in progress.
    pub fn has_active_order(&self) -> bool {
        self.order_id > 0
    }
}

/// Stateless decoder for vending-device advertisements.
pub struct AdvertisementDecoder;

impl AdvertisementDecoder {
    /// Decode a raw advertisement payload.
    ///
    /// Returns `None` when the buffer is shorter than
    /// [`MIN_ADVERTISEMENT_LEN`] or its vendor id is not one of
    /// [`VENDOR_IDS`]. Bytes beyond the fixed layout are ignored.
    pub fn decode(buf: &[u8]) -> Option<DeviceAdvertisement> {
        if buf.len() < MIN_ADVERTISEMENT_LEN {
            return None;
        }

        let vendor = &buf[VENDOR_ID_OFFSET..VENDOR_ID_OFFSET + 4];
        if !VENDOR_IDS.iter().any(|known| known.as_bytes() == vendor) {
            return None;
        }

        let vendor_id = ascii(vendor);
        let my_vendor_id = ascii(&buf[MY_VENDOR_ID_OFFSET..MY_VENDOR_ID_OFFSET + 3]);
        let numeric_id = be_u24(&buf[DEVICE_ID_OFFSET..DEVICE_ID_OFFSET + 3]);
        let checksum = hex::encode(&buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4]);

        let Ok(device_id) = DeviceId::new(numeric_id) else {
            let uuid = ascii(
                &buf[REGISTRATION_UUID_OFFSET..REGISTRATION_UUID_OFFSET + REGISTRATION_UUID_LEN],
            );
            return Some(DeviceAdvertisement::Registration(RegistrationRecord {
                vendor_id,
                my_vendor_id,
                numeric_id,
                uuid,
                checksum,
            }));
        };

        let order_id = u32::from_be_bytes([
            buf[ORDER_ID_OFFSET],
            buf[ORDER_ID_OFFSET + 1],
            buf[ORDER_ID_OFFSET + 2],
            buf[ORDER_ID_OFFSET + 3],
        ]);

        Some(DeviceAdvertisement::Status(StatusRecord {
            prefix: char::from(buf[PREFIX_OFFSET]),
            vendor_id,
            my_vendor_id,
            device_id,
            status: StatusCode::from_u8(buf[STATUS_OFFSET]),
            order_id,
            remaining: decode_remaining(&buf[REMAINING_OFFSET..REMAINING_OFFSET + 3]),
            used_quantity: be_u24(&buf[USED_QUANTITY_OFFSET..USED_QUANTITY_OFFSET + 3]),
            checksum,
        }))
    }
}

/// Shorthand for [`AdvertisementDecoder::decode`].
pub fn decode(buf: &[u8]) -> Option<DeviceAdvertisement> {
    AdvertisementDecoder::decode(buf)
}

fn decode_remaining(triple: &[u8]) -> Remaining {
    if triple == LEGACY_UNKNOWN_SENTINEL {
        return Remaining::Unknown;
    }

    if triple[0] & REMAINING_QUANTITY_FLAG != 0 {
        let quantity = be_u24(&[triple[0] & !REMAINING_QUANTITY_FLAG, triple[1], triple[2]]);
        return Remaining::Quantity(quantity);
    }

    let raw = be_u24(triple);
    let seconds = if raw >= DAY_ENCODING_THRESHOLD {
        u64::from(raw - DAY_ENCODING_THRESHOLD) * u64::from(SECONDS_PER_DAY)
    } else {
        u64::from(raw)
    };
    Remaining::Time(seconds)
}

fn be_u24(bytes: &[u8]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}

fn ascii(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}
