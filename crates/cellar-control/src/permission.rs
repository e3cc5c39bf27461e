//! Bluetooth authorization gate.

use crate::error::{ControlError, Result};
use cellar_ble::{BlePlatform, PermissionState};
use tracing::{debug, warn};

/// Fail unless Bluetooth access is granted.
///
/// An undetermined state triggers the system authorization prompt; a
/// denied state opens the permission settings page. Both still fail the
/// current operation with [`ControlError::PermissionRequired`], the user
/// retries once access is granted.
pub async fn ensure_permission<P: BlePlatform>(platform: &P) -> Result<()> {
    match platform.permission_state().await? {
        PermissionState::Granted => Ok(()),
        PermissionState::Undetermined => {
            debug!("Bluetooth permission undetermined, requesting");
            if let Err(e) = platform.request_permission().await {
                warn!(error = %e, "Permission request failed");
            }
            Err(ControlError::PermissionRequired)
        }
        PermissionState::Denied => {
            debug!("Bluetooth permission denied, opening settings");
            if let Err(e) = platform.open_permission_settings().await {
                warn!(error = %e, "Could not open permission settings");
            }
            Err(ControlError::PermissionRequired)
        }
    }
}
