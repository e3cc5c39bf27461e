//! In-memory diagnostics log.
//!
//! [`DebugLog`] is a `tracing-subscriber` layer that keeps the most recent
//! events so the app can show them on a debug screen or attach them to a
//! support report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Entries kept by [`DebugLog::default`].
pub const DEBUG_LOG_CAPACITY: usize = 100;

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    /// Structured fields other than the message, in recording order.
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Value of the field `name`, if recorded.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>5} {}: {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level,
            self.target,
            self.message
        )?;
        for (key, value) in &self.fields {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

/// Bounded ring of recent events. Clones share the same ring.
#[derive(Debug, Clone)]
pub struct DebugLog {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DEBUG_LOG_CAPACITY)
    }
}

impl DebugLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recorded entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl EntryVisitor {
    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for DebugLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.push(LogEntry {
            timestamp: Utc::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Install the global subscriber: `RUST_LOG` filtering (or `default_filter`),
/// formatted output and a [`DebugLog`].
///
/// Returns the installed log. If a global subscriber already exists it is
/// left in place and the returned log stays empty.
pub fn init_tracing(default_filter: &str) -> DebugLog {
    let log = DebugLog::default();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(log.clone())
        .try_init();
    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{info, warn};
    use tracing_subscriber::registry;

    fn capture(log: &DebugLog, f: impl FnOnce()) {
        tracing::subscriber::with_default(registry().with(log.clone()), f);
    }

    #[test]
    fn test_keeps_last_hundred_entries() {
        let log = DebugLog::default();
        capture(&log, || {
            for i in 0..150 {
                info!(i, "tick");
            }
        });

        let entries = log.entries();
        assert_eq!(entries.len(), 100);
        assert_eq!(entries[0].field("i"), Some("50"));
        assert_eq!(entries[99].field("i"), Some("149"));
    }

    #[test]
    fn test_records_message_level_and_fields() {
        let log = DebugLog::default();
        capture(&log, || {
            warn!(device_id = 12345, address = "AA:BB", "Connection failed");
        });

        let entry = &log.entries()[0];
        assert_eq!(entry.message, "Connection failed");
        assert_eq!(entry.level, "WARN");
        assert_eq!(entry.field("device_id"), Some("12345"));
        assert_eq!(entry.field("address"), Some("AA:BB"));
        assert!(entry.to_string().ends_with("Connection failed device_id=12345 address=AA:BB"));
    }

    #[test]
    fn test_clear() {
        let log = DebugLog::new(3);
        capture(&log, || info!("one"));
        assert!(!log.is_empty());

        log.clear();
        assert!(log.is_empty());
    }
}
