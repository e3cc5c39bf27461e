//! Backend-driven device control.
//!
//! The backend owns the command encryption. A control run asks it for a
//! ready-made hex command, delivers the command over BLE and reports the
//! outcome back:
//!
//! ```text
//! CommandSource::fetch_command ──> ControlProtocol::execute ──> ResultReporter::report
//!        │ failure                                                   ^
//!        └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The result is reported on every path, including a failed fetch.

use crate::error::{ControlError, Result};
use crate::protocol::{ControlProtocol, ControlReport};
use cellar_ble::BlePlatform;
use cellar_core::DeviceId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A control request issued by the app for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub order_id: String,
    pub device_id: DeviceId,
    pub user_id: String,
    /// Requested run time, when the order is time based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<u32>,
    /// Requested quantity, when the order is quantity based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

impl ControlRequest {
    pub fn new(
        order_id: impl Into<String>,
        device_id: DeviceId,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            device_id,
            user_id: user_id.into(),
            minutes: None,
            quantity: None,
        }
    }
}

/// Backend answer to a command request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, alias = "encryptCommand")]
    pub cmd: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(cmd: impl Into<String>) -> Self {
        Self {
            success: true,
            cmd: Some(cmd.into()),
            message: None,
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            cmd: None,
            message: Some(message.into()),
        }
    }

    /// The usable command, or the reason there is none.
    pub fn into_command(self) -> Result<String> {
        match self.cmd {
            Some(cmd) if self.success && !cmd.trim().is_empty() => Ok(cmd),
            _ => Err(ControlError::command_unavailable(
                self.message.unwrap_or_default(),
            )),
        }
    }
}

/// Outcome sent back to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultReport {
    pub order_id: String,
    pub device_id: DeviceId,
    pub success: bool,
    pub message: String,
}

/// Source of encrypted control commands.
pub trait CommandSource: Send + Sync {
    fn fetch_command(
        &self,
        request: &ControlRequest,
    ) -> impl Future<Output = Result<CommandResponse>> + Send;
}

/// Sink for control outcomes.
pub trait ResultReporter: Send + Sync {
    fn report(&self, report: &ResultReport) -> impl Future<Output = Result<()>> + Send;
}

/// Runs backend-issued commands through the control protocol.
pub struct DeviceController<P: BlePlatform, S, R> {
    protocol: Arc<ControlProtocol<P>>,
    source: S,
    reporter: R,
}

impl<P, S, R> DeviceController<P, S, R>
where
    P: BlePlatform,
    S: CommandSource,
    R: ResultReporter,
{
    pub fn new(protocol: Arc<ControlProtocol<P>>, source: S, reporter: R) -> Self {
        Self {
            protocol,
            source,
            reporter,
        }
    }

    /// Fetch, deliver and report one command.
    pub async fn execute(&self, request: &ControlRequest) -> ControlReport {
        let device_id = request.device_id;

        let report = match self.fetch(request).await {
            Ok(command) => self.protocol.execute(device_id, &command).await,
            Err(error) => {
                let order_id = &request.order_id;
                warn!(%order_id, %device_id, error = %error, "No control command");
                ControlReport::rejected(device_id, error)
            }
        };

        let result = ResultReport {
            order_id: request.order_id.clone(),
            device_id,
            success: report.success(),
            message: report.message(),
        };
        let order_id = &result.order_id;
        match self.reporter.report(&result).await {
            Ok(()) => debug!(%order_id, success = result.success, "Result reported"),
            Err(e) => warn!(%order_id, error = %e, "Result report failed"),
        }

        let success = report.success();
        info!(%order_id, %device_id, success, "Control request finished");
        report
    }

    async fn fetch(&self, request: &ControlRequest) -> Result<String> {
        self.source.fetch_command(request).await?.into_command()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CommandResponse::ok("00112233445566778899"), true)]
    #[case(CommandResponse::ok("   "), false)]
    #[case(CommandResponse::refused("订单已失效"), false)]
    #[case(
        CommandResponse {
            success: false,
            cmd: Some("00112233445566778899".into()),
            message: None,
        },
        false
    )]
    fn test_into_command(#[case] response: CommandResponse, #[case] usable: bool) {
        assert_eq!(response.into_command().is_ok(), usable);
    }

    #[test]
    fn test_refusal_keeps_backend_message() {
        let error = CommandResponse::refused("订单已失效").into_command().unwrap_err();
        assert_eq!(error.user_message(), "订单已失效");
    }

    #[test]
    fn test_response_accepts_encrypt_command_alias() {
        let response: CommandResponse =
            serde_json::from_str(r#"{"success": true, "encryptCommand": "AABB"}"#).unwrap();
        assert_eq!(response.cmd.as_deref(), Some("AABB"));
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = ResultReport {
            order_id: "ORD-1".into(),
            device_id: DeviceId::new(12345).unwrap(),
            success: true,
            message: "ok".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["orderId"], "ORD-1");
        assert_eq!(json["deviceId"], 12345);
    }
}
