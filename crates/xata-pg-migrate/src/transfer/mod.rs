//! Row streaming from the source cursor into the destination COPY sink.
//!
//! One table at a time: the source is counted, a read cursor is opened over
//! the declared columns and the destination pulls rows from it as it loads.
//! Only the cursor's current fetch batch is held in memory.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cancel::{cancellable, check_cancelled};
use crate::error::{MigrateError, Result};
use crate::progress::ProgressReporter;
use crate::source::{RowCursor, SourceReader, Table, TextRow};
use crate::target::{reset_sequence_sql, TargetWriter};

/// Statistics from copying one table.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Source row count taken before the copy.
    pub source_rows: i64,

    /// Rows the destination accepted.
    pub rows: u64,

    /// Whether the table was empty and the copy was skipped.
    pub skipped: bool,

    /// Wall time for the table.
    pub duration: Duration,
}

/// Cursor decorator that reports every produced row.
pub struct ProgressCursor<'a> {
    inner: Box<dyn RowCursor + 'a>,
    progress: &'a dyn ProgressReporter,
    table: &'a str,
    rows: u64,
}

impl<'a> ProgressCursor<'a> {
    pub fn new(
        inner: Box<dyn RowCursor + 'a>,
        progress: &'a dyn ProgressReporter,
        table: &'a str,
    ) -> Self {
        Self {
            inner,
            progress,
            table,
            rows: 0,
        }
    }

    /// Rows produced so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

#[async_trait]
impl<'a> RowCursor for ProgressCursor<'a> {
    async fn advance(&mut self) -> Result<Option<TextRow>> {
        let row = self.inner.advance().await?;
        if row.is_some() {
            self.rows += 1;
            self.progress.rows_advanced(self.table, self.rows);
        }
        Ok(row)
    }
}

/// Copy every row of `table` from `source` into `target`.
///
/// Empty tables are skipped without opening a cursor or writing to the
/// destination. After a copy the table's serial sequences are moved past the
/// copied ids. Any failure is reported as a transfer error naming the table.
/// Rows the destination committed before a failure stay in place. Every
/// round trip is abandoned as soon as `cancel` fires.
pub async fn transfer_table<S, T>(
    source: &mut S,
    target: &mut T,
    table: &Table,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<TransferStats>
where
    S: SourceReader + ?Sized,
    T: TargetWriter + ?Sized,
{
    let started = Instant::now();
    check_cancelled(cancel)?;

    let source_rows = cancellable(cancel, source.row_count(&table.name))
        .await
        .map_err(|e| e.in_transfer(&table.name))?;

    progress.table_started(&table.name, source_rows);

    if source_rows == 0 {
        debug!("{}: no rows, skipping copy", table.name);
        progress.table_finished(&table.name, 0);
        return Ok(TransferStats {
            source_rows,
            rows: 0,
            skipped: true,
            duration: started.elapsed(),
        });
    }

    let columns = table.column_names();
    let cursor = cancellable(cancel, source.open_cursor(table))
        .await
        .map_err(|e| e.in_transfer(&table.name))?;
    let mut cursor = ProgressCursor::new(cursor, progress, &table.name);

    let copied = cancellable(cancel, target.copy_in(&table.name, &columns, &mut cursor))
        .await
        .map_err(|e| e.in_transfer(&table.name))?;

    for sql in reset_sequence_sql(table) {
        debug!("{}", sql);
        cancellable(cancel, target.execute(&sql))
            .await
            .map_err(|e| e.in_transfer(&table.name))?;
    }

    progress.table_finished(&table.name, copied);

    let duration = started.elapsed();
    info!(
        "{}: copied {} rows in {:.2}s",
        table.name,
        copied,
        duration.as_secs_f64()
    );

    Ok(TransferStats {
        source_rows,
        rows: copied,
        skipped: false,
        duration,
    })
}

/// Compare the destination row count of `table` against `expected`.
pub async fn verify_row_count<T>(target: &mut T, table: &str, expected: i64) -> Result<()>
where
    T: TargetWriter + ?Sized,
{
    let actual = target
        .row_count(table)
        .await
        .map_err(|e| e.in_transfer(table))?;
    if actual != expected {
        return Err(MigrateError::Validation(format!(
            "{}: source has {} rows, destination has {}",
            table, expected, actual
        )));
    }
    debug!("{}: row count verified ({})", table, actual);
    Ok(())
}
