//! Migration orchestrator - sequences the migration phases.
//!
//! A run moves through `Connected -> SchemaIntrospected -> SchemaApplied ->
//! DataCopied -> Done`. Every table finishes a phase before any table starts
//! the next one. The first error moves the run to `Failed` and is returned
//! unchanged; nothing is retried.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cancel::{cancellable, check_cancelled};
use crate::config::Config;
use crate::connection::{self, Endpoint};
use crate::error::{MigrateError, Result};
use crate::progress::ProgressReporter;
use crate::source::{PgSource, SourceReader, Table};
use crate::target::{apply_schema, create_table_sql, drop_table_sql, PgTarget, TargetWriter};
use crate::transfer::{transfer_table, verify_row_count};
use crate::typemap::sanitize_tables;

/// Where a run currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    /// Both endpoints are connected; nothing has been read yet.
    Connected,
    /// The schema snapshot has been built and sanitized.
    SchemaIntrospected,
    /// Every table has been dropped and recreated on the destination.
    SchemaApplied,
    /// Every table's rows have been copied.
    DataCopied,
    /// The run finished.
    Done,
    /// The run stopped at an error.
    Failed(String),
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::Connected => write!(f, "connected"),
            MigrationPhase::SchemaIntrospected => write!(f, "schema introspected"),
            MigrationPhase::SchemaApplied => write!(f, "schema applied"),
            MigrationPhase::DataCopied => write!(f, "data copied"),
            MigrationPhase::Done => write!(f, "done"),
            MigrationPhase::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Per-table outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableResult {
    pub name: String,
    pub rows: u64,
    /// The table was empty and no copy was started.
    pub skipped: bool,
    pub duration_ms: u64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: `completed` or `dry_run`.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total tables in the snapshot.
    pub tables_total: usize,

    /// Total rows transferred.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    /// Per-table results, in snapshot order. Empty for a dry run.
    pub tables: Vec<TableResult>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Row counts for one table on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableValidation {
    pub table: String,
    pub source_rows: i64,
    /// `None` when the destination count failed, e.g. the table is missing.
    pub target_rows: Option<i64>,
    pub matches: bool,
}

/// Outcome of comparing source and destination row counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub tables: Vec<TableValidation>,
}

impl ValidationReport {
    /// Names of tables whose counts differ.
    pub fn mismatches(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.matches)
            .map(|t| t.table.as_str())
            .collect()
    }

    /// Fail with a validation error if any table differs.
    pub fn ensure_match(&self) -> Result<()> {
        let mismatches = self.mismatches();
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(MigrateError::Validation(format!(
                "{} table(s) differ between source and destination: {}",
                mismatches.len(),
                mismatches.join(", ")
            )))
        }
    }
}

/// Connectivity of both endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Test both connections independently, reporting latency and any error.
pub async fn health_check(config: &Config) -> HealthCheckResult {
    let (source_connected, source_latency_ms, source_error) =
        check_endpoint(config, Endpoint::Source).await;
    let (target_connected, target_latency_ms, target_error) =
        check_endpoint(config, Endpoint::Target).await;

    HealthCheckResult {
        source_connected,
        source_latency_ms,
        source_error,
        target_connected,
        target_latency_ms,
        target_error,
        healthy: source_connected && target_connected,
    }
}

async fn check_endpoint(config: &Config, endpoint: Endpoint) -> (bool, u64, Option<String>) {
    let endpoint_config = match endpoint {
        Endpoint::Source => &config.source,
        Endpoint::Target => &config.target,
    };
    let started = Instant::now();
    match connection::connect(endpoint_config, endpoint).await {
        Ok(_client) => (true, started.elapsed().as_millis() as u64, None),
        Err(e) => {
            warn!("{} health check failed: {}", endpoint, e);
            (false, started.elapsed().as_millis() as u64, Some(e.to_string()))
        }
    }
}

/// Drives a migration between one source and one destination.
pub struct Orchestrator<S = PgSource, T = PgTarget> {
    config: Config,
    source: S,
    target: T,
    phase: MigrationPhase,
}

impl Orchestrator<PgSource, PgTarget> {
    /// Connect to both endpoints.
    ///
    /// The source is connected first; if it is unreachable the destination
    /// is never contacted.
    pub async fn connect(config: Config) -> Result<Self> {
        let source_client = connection::connect(&config.source, Endpoint::Source).await?;
        let target_client = connection::connect(&config.target, Endpoint::Target).await?;

        let source = PgSource::new(source_client, config.migration.fetch_size);
        let target = PgTarget::new(target_client);
        Ok(Self::from_parts(config, source, target))
    }
}

impl<S, T> Orchestrator<S, T>
where
    S: SourceReader,
    T: TargetWriter,
{
    /// Build an orchestrator over already-connected endpoints.
    pub fn from_parts(config: Config, source: S, target: T) -> Self {
        info!("Migration phase: {}", MigrationPhase::Connected);
        Self {
            config,
            source,
            target,
            phase: MigrationPhase::Connected,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> &MigrationPhase {
        &self.phase
    }

    /// Release the endpoints.
    pub fn into_parts(self) -> (S, T) {
        (self.source, self.target)
    }

    fn transition(&mut self, next: MigrationPhase) {
        info!("Migration phase: {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Build the sanitized schema snapshot.
    pub async fn extract_schema(&mut self, cancel: &CancellationToken) -> Result<Vec<Table>> {
        let mut tables = self.source.extract_schema(cancel).await?;
        sanitize_tables(&mut tables);
        Ok(tables)
    }

    /// Run the migration.
    ///
    /// With `dry_run`, the schema is introspected and the DDL that would be
    /// applied is logged; the destination is not written.
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
        dry_run: bool,
    ) -> Result<MigrationResult> {
        if self.phase != MigrationPhase::Connected {
            return Err(MigrateError::Config(format!(
                "migration cannot start from phase '{}'",
                self.phase
            )));
        }

        match self.run_phases(cancel, progress, dry_run).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Migration failed in phase '{}': {}", self.phase, e);
                self.transition(MigrationPhase::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_phases(
        &mut self,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
        dry_run: bool,
    ) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        let tables = self.extract_schema(cancel).await?;
        info!("Found {} tables to migrate", tables.len());
        self.transition(MigrationPhase::SchemaIntrospected);
        check_cancelled(cancel)?;

        if dry_run {
            for table in &tables {
                info!("[dry run] {}", drop_table_sql(&table.name));
                info!("[dry run] {}", create_table_sql(table));
            }
            self.transition(MigrationPhase::Done);
            let tables_total = tables.len();
            return Ok(self.summary(run_id, "dry_run", started_at, started, tables_total, Vec::new()));
        }

        apply_schema(&mut self.target, &tables, cancel).await?;
        self.transition(MigrationPhase::SchemaApplied);
        check_cancelled(cancel)?;

        let mut results = Vec::with_capacity(tables.len());
        for table in &tables {
            let stats =
                transfer_table(&mut self.source, &mut self.target, table, progress, cancel).await?;
            if self.config.migration.verify_row_counts {
                cancellable(
                    cancel,
                    verify_row_count(&mut self.target, &table.name, stats.source_rows),
                )
                .await?;
            }
            results.push(TableResult {
                name: table.name.clone(),
                rows: stats.rows,
                skipped: stats.skipped,
                duration_ms: stats.duration.as_millis() as u64,
            });
        }
        self.transition(MigrationPhase::DataCopied);

        let tables_total = tables.len();
        let result = self.summary(run_id, "completed", started_at, started, tables_total, results);
        info!(
            "Migration complete: {} tables, {} rows in {:.2}s ({} rows/sec)",
            result.tables_total,
            result.rows_transferred,
            result.duration_seconds,
            result.rows_per_second
        );
        self.transition(MigrationPhase::Done);
        Ok(result)
    }

    fn summary(
        &self,
        run_id: String,
        status: &str,
        started_at: DateTime<Utc>,
        started: Instant,
        tables_total: usize,
        tables: Vec<TableResult>,
    ) -> MigrationResult {
        let elapsed = started.elapsed().as_secs_f64();
        let rows_transferred: u64 = tables.iter().map(|t| t.rows).sum();
        let rows_per_second = if elapsed > 0.0 {
            (rows_transferred as f64 / elapsed) as i64
        } else {
            0
        };

        MigrationResult {
            run_id,
            status: status.to_string(),
            duration_seconds: elapsed,
            started_at,
            completed_at: Utc::now(),
            tables_total,
            rows_transferred,
            rows_per_second,
            tables,
        }
    }

    /// Compare row counts between source and destination for every source table.
    pub async fn validate(&mut self) -> Result<ValidationReport> {
        let tables = self.source.extract_schema(&CancellationToken::new()).await?;
        let mut report = ValidationReport::default();

        for table in &tables {
            let source_rows = self
                .source
                .row_count(&table.name)
                .await
                .map_err(|e| e.in_introspection(Some(&table.name)))?;
            let target_rows = match self.target.row_count(&table.name).await {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!("{}: destination count failed: {}", table.name, e);
                    None
                }
            };

            let matches = target_rows == Some(source_rows);
            if matches {
                info!("{}: {} rows (match)", table.name, source_rows);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table.name,
                    source_rows,
                    target_rows.map_or_else(|| "missing".to_string(), |c| c.to_string())
                );
            }

            report.tables.push(TableValidation {
                table: table.name.clone(),
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(report)
    }
}
