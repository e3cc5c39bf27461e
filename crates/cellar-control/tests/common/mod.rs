//! Shared fixtures for control integration tests.

#![allow(dead_code)]

use cellar_ble::ScanRecord;
use cellar_ble::mock::{MockPlatform, MockPlatformHandle, StatusPayload, foreign_payload};
use cellar_control::{
    CellarConfig, CommandResponse, CommandSource, ControlError, ControlRequest, ControlStack,
    ResultReport, ResultReporter,
};
use cellar_core::{DeviceId, TransportAddress};
use std::sync::{Arc, Mutex};

/// Device used by most scenarios.
pub const DEVICE: u32 = 12345;

/// 45-byte command: three frames of 20, 20 and 5 bytes.
pub const COMMAND: &str =
    "A1B2C3D4E5F60718293A4B5C6D7E8F90A1B2C3D4E5F60718293A4B5C6D7E8F90A1B2C3D4E5F60718293A4B5C6D";

pub fn device() -> DeviceId {
    DeviceId::new(DEVICE).unwrap()
}

/// Transport address `id` advertises from.
pub fn address_of(id: u32) -> TransportAddress {
    let [_, high, mid, low] = id.to_be_bytes();
    TransportAddress::new(format!("AA:BB:CC:{high:02X}:{mid:02X}:{low:02X}")).unwrap()
}

pub fn address() -> TransportAddress {
    address_of(DEVICE)
}

/// Status advertisement of `id` seen at a fixed address.
pub fn sighting(id: u32, status: u8) -> ScanRecord {
    ScanRecord::new(address_of(id), -55, StatusPayload::new(id).status(status).build())
}

/// Advertisement of an unrelated peripheral.
pub fn noise() -> ScanRecord {
    ScanRecord::new(
        TransportAddress::new("10:20:30:40:50:60").unwrap(),
        -80,
        foreign_payload(),
    )
}

/// `count` discovery callbacks of noise.
pub fn noise_batches(count: usize) -> Vec<Vec<ScanRecord>> {
    (0..count).map(|_| vec![noise()]).collect()
}

pub fn stack_with(config: CellarConfig) -> (ControlStack<MockPlatform>, MockPlatformHandle) {
    let (platform, handle) = MockPlatform::new();
    (ControlStack::new(platform, config), handle)
}

pub fn stack() -> (ControlStack<MockPlatform>, MockPlatformHandle) {
    stack_with(CellarConfig::default())
}

/// Command source answering every request with the same response.
pub struct ScriptedSource {
    response: std::result::Result<CommandResponse, ControlError>,
    requests: Arc<Mutex<Vec<ControlRequest>>>,
}

impl ScriptedSource {
    pub fn answering(response: CommandResponse) -> Self {
        Self {
            response: Ok(response),
            requests: Arc::default(),
        }
    }

    pub fn failing(error: ControlError) -> Self {
        Self {
            response: Err(error),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<ControlRequest>>> {
        Arc::clone(&self.requests)
    }
}

impl CommandSource for ScriptedSource {
    async fn fetch_command(
        &self,
        request: &ControlRequest,
    ) -> cellar_control::Result<CommandResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.response.clone()
    }
}

/// Reporter recording every report, optionally failing.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<ResultReport>>>,
    fail: bool,
}

impl RecordingReporter {
    pub fn failing() -> Self {
        Self {
            reports: Arc::default(),
            fail: true,
        }
    }

    pub fn reports(&self) -> Arc<Mutex<Vec<ResultReport>>> {
        Arc::clone(&self.reports)
    }
}

impl ResultReporter for RecordingReporter {
    async fn report(&self, report: &ResultReport) -> cellar_control::Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        if self.fail {
            Err(ControlError::report_failed("backend unavailable"))
        } else {
            Ok(())
        }
    }
}
