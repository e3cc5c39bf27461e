//! Device discovery for a single numeric id.
//!
//! A [`Scanner`] owns the radio for the duration of one scan. Requests are
//! served one at a time in arrival order; a request that arrives while a
//! scan is running waits for it to finish, then starts its own session.
//!
//! Each scan ends in exactly one of three ways:
//!
//! - a matching advertisement arrives: [`ScanOutcome::Found`]
//! - the deadline passes or the callback cap is reached: [`ScanOutcome::NotFound`]
//! - discovery cannot start: `Err`
//!
//! In every case the discovery session is stopped and unsubscribed by the
//! [`DiscoverySession`] guard. The scan holds an [`AdapterLease`] while it
//! runs, so the adapter is open before discovery starts and stays open for
//! any other lease holder after the scan ends.

use crate::{
    adapter::{Adapter, AdapterLease},
    error::Result,
    traits::BlePlatform,
    types::{DiscoveryOptions, ScanRecord},
};
use cellar_core::{
    DeviceId, TransportAddress,
    constants::{DEFAULT_MAX_CALLBACKS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SCAN_TIMEOUT_MS},
};
use cellar_protocol::{AdvertisementDecoder, DeviceAdvertisement, StatusRecord};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

/// Progress observer, called with the running callback count.
pub type ProgressFn = Arc<dyn Fn(u32) + Send + Sync>;

/// Acceptance predicate on a decoded status record.
pub type AcceptFn = Arc<dyn Fn(&StatusRecord) -> bool + Send + Sync>;

/// Parameters of one scan.
#[derive(Clone)]
pub struct ScanRequest {
    target: DeviceId,
    timeout: Duration,
    poll_interval: Duration,
    max_callbacks: u32,
    silent: bool,
    progress: Option<ProgressFn>,
    accept: Option<AcceptFn>,
}

impl ScanRequest {
    /// Scan for `target` with default timeout, poll interval and callback cap.
    pub fn new(target: DeviceId) -> Self {
        Self {
            target,
            timeout: Duration::from_millis(DEFAULT_SCAN_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_callbacks: DEFAULT_MAX_CALLBACKS,
            silent: false,
            progress: None,
            accept: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Give up after this many discovery callbacks.
    pub fn max_callbacks(mut self, max: u32) -> Self {
        self.max_callbacks = max.max(1);
        self
    }

    /// Suppress progress reporting and lower log levels.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn on_progress(mut self, progress: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Only resolve on a status record passing `accept`.
    ///
    /// Records with the right id that fail the predicate are kept as
    /// `last_seen` of [`ScanOutcome::NotFound`].
    pub fn accept_if(
        mut self,
        accept: impl Fn(&StatusRecord) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.accept = Some(Arc::new(accept));
        self
    }

    pub fn target(&self) -> DeviceId {
        self.target
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    fn accepts(&self, status: &StatusRecord) -> bool {
        self.accept.as_ref().is_none_or(|accept| accept(status))
    }
}

impl fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRequest")
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("max_callbacks", &self.max_callbacks)
            .field("silent", &self.silent)
            .field("progress", &self.progress.is_some())
            .field("accept", &self.accept.is_some())
            .finish()
    }
}

/// A matching advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHit {
    pub address: TransportAddress,
    pub rssi: i16,
    pub status: StatusRecord,
    pub received_at: DateTime<Utc>,
}

/// Why a scan ended without a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    Timeout,
    CallbackCap,
}

/// Result of a scan that could start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(ScanHit),
    NotFound {
        reason: NotFoundReason,
        callbacks: u32,
        /// Last advertisement of the target that the predicate rejected.
        last_seen: Option<ScanHit>,
    },
}

impl ScanOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn hit(&self) -> Option<&ScanHit> {
        match self {
            Self::Found(hit) => Some(hit),
            Self::NotFound { .. } => None,
        }
    }

    pub fn into_hit(self) -> Option<ScanHit> {
        match self {
            Self::Found(hit) => Some(hit),
            Self::NotFound { .. } => None,
        }
    }
}

/// Scoped discovery subscription.
///
/// Dropping the session stops discovery on the platform and drops the
/// batch receiver.
pub struct DiscoverySession<'a, P: BlePlatform> {
    platform: &'a P,
    batches: mpsc::Receiver<Vec<ScanRecord>>,
}

impl<'a, P: BlePlatform> DiscoverySession<'a, P> {
    /// Start discovery on `platform`.
    pub async fn start(platform: &'a P, options: DiscoveryOptions) -> Result<Self> {
        let batches = platform.start_discovery(options).await?;
        trace!(interval_ms = options.interval.as_millis() as u64, "Discovery started");
        Ok(Self { platform, batches })
    }

    /// Next discovery callback, `None` once the platform closes the stream.
    pub async fn next_batch(&mut self) -> Option<Vec<ScanRecord>> {
        self.batches.recv().await
    }
}

impl<P: BlePlatform> Drop for DiscoverySession<'_, P> {
    fn drop(&mut self) {
        self.platform.stop_discovery();
        trace!("Discovery stopped");
    }
}

/// Serialized device scanner.
pub struct Scanner<P: BlePlatform> {
    platform: Arc<P>,
    adapter: Arc<Adapter<P>>,
    radio: Mutex<()>,
}

impl<P: BlePlatform> Scanner<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            adapter: Arc::new(Adapter::new(Arc::clone(&platform))),
            platform,
            radio: Mutex::new(()),
        }
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Adapter owner shared by every scan and by callers that need the
    /// adapter open across several operations.
    pub fn adapter(&self) -> &Arc<Adapter<P>> {
        &self.adapter
    }

    /// Scan for the request's target.
    ///
    /// Waits for any running scan first. The timeout is measured from the
    /// moment this scan owns the radio.
    ///
    /// # Errors
    /// Returns the platform error if the adapter cannot be opened or
    /// discovery cannot start.
    pub async fn scan(&self, request: ScanRequest) -> Result<ScanOutcome> {
        let _radio = self.radio.lock().await;
        let target = request.target;

        let lease = match self.adapter.acquire().await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(device_id = %target, error = %e, "Adapter unavailable for scan");
                return Err(e);
            }
        };

        let outcome = self.run(&request).await;
        release(lease).await;
        outcome
    }

    async fn run(&self, request: &ScanRequest) -> Result<ScanOutcome> {
        let target = request.target;
        let timeout_ms = request.timeout.as_millis() as u64;
        if request.silent {
            debug!(device_id = %target, timeout_ms, "Silent scan started");
        } else {
            info!(device_id = %target, timeout_ms, "Scan started");
        }

        let options = DiscoveryOptions {
            allow_duplicates: true,
            interval: request.poll_interval,
        };
        let mut session = match DiscoverySession::start(self.platform.as_ref(), options).await {
            Ok(session) => session,
            Err(e) => {
                warn!(device_id = %target, error = %e, "Discovery failed to start");
                return Err(e);
            }
        };

        let deadline = Instant::now() + request.timeout;
        let mut callbacks = 0u32;
        let mut last_seen = None;

        let reason = loop {
            let batch = tokio::select! {
                batch = session.next_batch() => batch,
                _ = sleep_until(deadline) => break NotFoundReason::Timeout,
            };

            let Some(batch) = batch else {
                // Stream ended early: nothing more can match, but the
                // caller still gets the full window.
                sleep_until(deadline).await;
                break NotFoundReason::Timeout;
            };

            callbacks += 1;
            if !request.silent
                && let Some(progress) = &request.progress
            {
                progress(callbacks);
            }

            for record in batch {
                let Some(hit) = match_record(record, target) else {
                    continue;
                };

                if request.accepts(&hit.status) {
                    drop(session);
                    log_found(request, &hit, callbacks);
                    return Ok(ScanOutcome::Found(hit));
                }
                trace!(
                    device_id = %target,
                    status = %hit.status.status,
                    "Target seen, not accepted"
                );
                last_seen = Some(hit);
            }

            if callbacks >= request.max_callbacks {
                break NotFoundReason::CallbackCap;
            }
        };

        drop(session);
        debug!(device_id = %target, ?reason, callbacks, "Scan ended without match");
        Ok(ScanOutcome::NotFound {
            reason,
            callbacks,
            last_seen,
        })
    }
}

async fn release<P: BlePlatform>(lease: AdapterLease<P>) {
    if let Err(e) = lease.release().await {
        debug!(error = %e, "Closing adapter after scan failed");
    }
}

fn match_record(record: ScanRecord, target: DeviceId) -> Option<ScanHit> {
    match AdvertisementDecoder::decode(&record.advertisement) {
        Some(DeviceAdvertisement::Status(status)) if status.device_id == target => Some(ScanHit {
            address: record.address,
            rssi: record.rssi,
            status,
            received_at: record.received_at,
        }),
        Some(_) => None,
        None => {
            trace!(address = %record.address, "Ignoring non-device advertisement");
            None
        }
    }
}

fn log_found(request: &ScanRequest, hit: &ScanHit, callbacks: u32) {
    let (device_id, address) = (request.target, &hit.address);
    if request.silent {
        debug!(%device_id, %address, rssi = hit.rssi, callbacks, "Device found");
    } else {
        info!(%device_id, %address, rssi = hit.rssi, callbacks, "Device found");
    }
}
