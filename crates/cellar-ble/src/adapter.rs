//! Shared ownership of the Bluetooth adapter.
//!
//! The host has one adapter. Every component that needs the radio takes an
//! [`AdapterLease`]; the adapter is opened by the first lease and closed
//! when the last one is released, so no holder can close it under another.
//!
//! ```text
//! acquire()   holders 0 -> 1   open_adapter()
//! acquire()   holders 1 -> 2
//! release()   holders 2 -> 1
//! release()   holders 1 -> 0   close_adapter()
//! ```

use crate::{error::Result, traits::BlePlatform};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Reference-counted adapter owner.
pub struct Adapter<P: BlePlatform> {
    platform: Arc<P>,
    holders: Mutex<usize>,
}

impl<P: BlePlatform> Adapter<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            holders: Mutex::new(0),
        }
    }

    /// Take a lease, opening the adapter if nobody holds one.
    ///
    /// # Errors
    /// Returns the platform error if the adapter cannot be opened. No lease
    /// is taken in that case.
    pub async fn acquire(self: &Arc<Self>) -> Result<AdapterLease<P>> {
        let mut holders = self.holders.lock().await;
        if *holders == 0 {
            self.platform.open_adapter().await?;
            debug!("Adapter opened");
        }
        *holders += 1;
        trace!(holders = *holders, "Adapter lease taken");

        Ok(AdapterLease {
            adapter: Some(Arc::clone(self)),
        })
    }

    /// Number of outstanding leases.
    pub async fn holders(&self) -> usize {
        *self.holders.lock().await
    }

    async fn release_one(&self) -> Result<()> {
        let mut holders = self.holders.lock().await;
        *holders = holders.saturating_sub(1);
        trace!(holders = *holders, "Adapter lease released");

        if *holders == 0 {
            self.platform.close_adapter().await?;
            debug!("Adapter closed");
        }
        Ok(())
    }
}

/// One holder's claim on the open adapter.
///
/// Prefer [`AdapterLease::release`]. A lease dropped without it (for
/// example by a cancelled task) is released on a spawned task.
pub struct AdapterLease<P: BlePlatform> {
    adapter: Option<Arc<Adapter<P>>>,
}

impl<P: BlePlatform> AdapterLease<P> {
    /// Give the lease back, closing the adapter if this was the last one.
    ///
    /// # Errors
    /// Returns the platform error if closing the adapter fails.
    pub async fn release(mut self) -> Result<()> {
        match self.adapter.take() {
            Some(adapter) => adapter.release_one().await,
            None => Ok(()),
        }
    }
}

impl<P: BlePlatform> Drop for AdapterLease<P> {
    fn drop(&mut self) {
        let Some(adapter) = self.adapter.take() else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = adapter.release_one().await {
                    debug!(error = %e, "Closing adapter after dropped lease failed");
                }
            });
        }
    }
}
