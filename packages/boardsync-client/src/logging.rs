/// Logger setup: env_logger to stderr, plus a bounded in-memory ring of
/// recent entries so a host can report what went wrong before it exits.
use std::collections::VecDeque;
use std::sync::{LazyLock, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use env_logger::Logger;
use log::{Log, Metadata, Record, SetLoggerError};
use serde::Serialize;

const MAX_LOG_ENTRIES: usize = 2000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: String,
    pub target: String,
    pub message: String,
}

struct LogHub {
    entries: Mutex<VecDeque<LogEntry>>,
}

impl LogHub {
    fn push(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push_back(entry);
            while entries.len() > MAX_LOG_ENTRIES {
                entries.pop_front();
            }
        }
    }

    fn recent_entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn problems(&self) -> Vec<LogEntry> {
        self.recent_entries()
            .into_iter()
            .filter(|e| e.level == "warn" || e.level == "error")
            .collect()
    }
}

static LOG_HUB: LazyLock<LogHub> = LazyLock::new(|| LogHub {
    entries: Mutex::new(VecDeque::with_capacity(MAX_LOG_ENTRIES)),
});

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct RingLogger {
    inner: Logger,
}

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.inner.matches(record) {
            return;
        }
        self.inner.log(record);
        LOG_HUB.push(LogEntry {
            timestamp_ms: now_ms(),
            level: record.level().to_string().to_lowercase(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the logger. The filter comes from `RUST_LOG`, default `info`.
pub fn init() -> Result<(), SetLoggerError> {
    let inner = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .build();
    let max_level = inner.filter();
    log::set_boxed_logger(Box::new(RingLogger { inner }))?;
    log::set_max_level(max_level);
    Ok(())
}

pub fn recent_entries() -> Vec<LogEntry> {
    LOG_HUB.recent_entries()
}

/// Warnings and errors still held in the ring, oldest first.
pub fn recent_problems() -> Vec<LogEntry> {
    LOG_HUB.problems()
}
