//! Advertisement payload builders for scripted discovery.

use bytes::Bytes;

/// Builder for a 29-byte vending-device status advertisement.
///
/// # Examples
///
/// ```
/// use cellar_ble::mock::StatusPayload;
/// use cellar_protocol::decode;
///
/// let payload = StatusPayload::new(12345).status(1).build();
/// let record = decode(&payload).unwrap();
/// assert_eq!(record.device_id().unwrap().as_u32(), 12345);
/// ```
#[derive(Debug, Clone)]
pub struct StatusPayload {
    buf: [u8; 29],
}

impl StatusPayload {
    /// Payload of the `002C` family: status idle, no order, nothing remaining.
    pub fn new(device_id: u32) -> Self {
        let mut buf = [0u8; 29];
        buf[0] = b'W';
        buf[5..9].copy_from_slice(b"002C");
        buf[11..14].copy_from_slice(&device_id.to_be_bytes()[1..]);
        Self { buf }
    }

    pub fn status(mut self, code: u8) -> Self {
        self.buf[14] = code;
        self
    }

    pub fn order_id(mut self, order_id: u32) -> Self {
        self.buf[15..19].copy_from_slice(&order_id.to_be_bytes());
        self
    }

    /// Raw remaining triple (bytes 19..22).
    pub fn remaining(mut self, triple: [u8; 3]) -> Self {
        self.buf[19..22].copy_from_slice(&triple);
        self
    }

    pub fn used_quantity(mut self, used: u32) -> Self {
        self.buf[22..25].copy_from_slice(&used.to_be_bytes()[1..]);
        self
    }

    pub fn build(self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }
}

/// Advertisement of an unrelated peripheral.
pub fn foreign_payload() -> Bytes {
    let mut buf = [0x4Cu8; 31];
    buf[5..9].copy_from_slice(b"APPL");
    Bytes::copy_from_slice(&buf)
}
