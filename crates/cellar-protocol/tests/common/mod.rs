//! Shared payload builders for protocol integration tests.

#![allow(dead_code)]

/// Builder for raw 29-byte advertisement payloads.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    buf: [u8; 29],
}

impl PayloadBuilder {
    /// Status payload from the `002C` family with every field zeroed.
    pub fn status(device_id: u32) -> Self {
        let mut buf = [0u8; 29];
        buf[0] = b'W';
        buf[5..9].copy_from_slice(b"002C");
        buf[11..14].copy_from_slice(&device_id.to_be_bytes()[1..]);
        Self { buf }
    }

    /// Registration payload carrying an 8-character UUID.
    pub fn registration(uuid: &[u8; 8]) -> Self {
        let mut builder = Self::status(0);
        builder.buf[14..22].copy_from_slice(uuid);
        builder
    }

    pub fn vendor(mut self, vendor: &[u8; 4]) -> Self {
        self.buf[5..9].copy_from_slice(vendor);
        self
    }

    pub fn status_code(mut self, code: u8) -> Self {
        self.buf[14] = code;
        self
    }

    pub fn order_id(mut self, order_id: u32) -> Self {
        self.buf[15..19].copy_from_slice(&order_id.to_be_bytes());
        self
    }

    pub fn remaining(mut self, triple: [u8; 3]) -> Self {
        self.buf[19..22].copy_from_slice(&triple);
        self
    }

    pub fn used(mut self, used: u32) -> Self {
        self.buf[22..25].copy_from_slice(&used.to_be_bytes()[1..]);
        self
    }

    pub fn checksum(mut self, checksum: [u8; 4]) -> Self {
        self.buf[25..29].copy_from_slice(&checksum);
        self
    }

    pub fn build(self) -> [u8; 29] {
        self.buf
    }
}
