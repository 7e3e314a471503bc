//! Progress reporting for the row streamer.
//!
//! Reporters are notified synchronously from the copy loop, so they must be
//! cheap. Output is throttled to one update every `interval` rows.

use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::info;

/// Default number of rows between progress updates.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;

/// Observer of per-table copy progress.
pub trait ProgressReporter: Send + Sync {
    /// A table's copy is about to start. `total` is the source row count.
    fn table_started(&self, table: &str, total: i64);

    /// `rows` rows of `table` have been handed to the destination so far.
    fn rows_advanced(&self, table: &str, rows: u64);

    /// A table's copy completed with `rows` rows.
    fn table_finished(&self, table: &str, rows: u64);
}

/// Reporter that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn table_started(&self, _table: &str, _total: i64) {}
    fn rows_advanced(&self, _table: &str, _rows: u64) {}
    fn table_finished(&self, _table: &str, _rows: u64) {}
}

/// Reporter that logs through `tracing`.
#[derive(Debug, Clone, Copy)]
pub struct LogProgress {
    interval: u64,
}

impl LogProgress {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

impl ProgressReporter for LogProgress {
    fn table_started(&self, table: &str, total: i64) {
        info!("Copying {} ({} rows)", table, total);
    }

    fn rows_advanced(&self, table: &str, rows: u64) {
        if rows % self.interval == 0 {
            info!("{}: {} rows copied", table, rows);
        }
    }

    fn table_finished(&self, table: &str, rows: u64) {
        info!("Finished {}: {} rows", table, rows);
    }
}

/// One progress event, as emitted by [`JsonProgress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// `started`, `progress` or `finished`.
    pub event: String,
    pub table: String,
    /// Rows copied so far.
    pub rows: u64,
    /// Source row count, only present on `started`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

impl ProgressUpdate {
    fn new(event: &str, table: &str, rows: u64, total: Option<i64>) -> Self {
        Self {
            event: event.to_string(),
            table: table.to_string(),
            rows,
            total,
        }
    }
}

/// Reporter that prints JSON lines to stderr.
#[derive(Debug, Clone, Copy)]
pub struct JsonProgress {
    interval: u64,
}

impl JsonProgress {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
        }
    }

    fn emit(&self, update: &ProgressUpdate) {
        if let Ok(line) = serde_json::to_string(update) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
        }
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

impl ProgressReporter for JsonProgress {
    fn table_started(&self, table: &str, total: i64) {
        self.emit(&ProgressUpdate::new("started", table, 0, Some(total)));
    }

    fn rows_advanced(&self, table: &str, rows: u64) {
        if rows % self.interval == 0 {
            self.emit(&ProgressUpdate::new("progress", table, rows, None));
        }
    }

    fn table_finished(&self, table: &str, rows: u64) {
        self.emit(&ProgressUpdate::new("finished", table, rows, None));
    }
}
