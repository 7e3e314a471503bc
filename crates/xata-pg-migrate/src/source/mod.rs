//! Source database operations.
//!
//! The catalog reader and row cursor are expressed as traits so the pipeline
//! can run against any implementation; [`PgSource`] is the PostgreSQL one.

mod postgres;
mod types;

pub use postgres::{select_sql, PgRowCursor, PgSource};
pub use types::*;

use crate::cancel::cancellable;
use crate::error::Result;
use crate::identifier::FIXED_SCHEMA;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Forward-only iteration over the rows of one table.
#[async_trait]
pub trait RowCursor: Send {
    /// Fetch the next row, or `None` once the table is exhausted.
    async fn advance(&mut self) -> Result<Option<TextRow>>;
}

/// Read schema and data from the source database.
#[async_trait]
pub trait SourceReader: Send {
    /// List table names in the fixed schema, in catalog order.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Load column metadata for a table, in catalog order.
    async fn load_columns(&mut self, table: &str) -> Result<Vec<Column>>;

    /// Load primary key column names for a table, in key order.
    async fn load_primary_key(&mut self, table: &str) -> Result<Vec<String>>;

    /// Build the schema snapshot.
    ///
    /// Runs the three catalog steps for every table. The first failure
    /// aborts the whole snapshot and is reported with the table name. Each
    /// catalog query is abandoned as soon as `cancel` fires.
    async fn extract_schema(&mut self, cancel: &CancellationToken) -> Result<Vec<Table>> {
        let names = cancellable(cancel, self.list_tables())
            .await
            .map_err(|e| e.in_introspection(None))?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = cancellable(cancel, self.load_columns(&name))
                .await
                .map_err(|e| e.in_introspection(Some(&name)))?;
            let primary_key = cancellable(cancel, self.load_primary_key(&name))
                .await
                .map_err(|e| e.in_introspection(Some(&name)))?;

            debug!(
                "Loaded {} columns for {} (primary key: {:?})",
                columns.len(),
                name,
                primary_key
            );

            tables.push(Table {
                name,
                columns,
                primary_key,
            });
        }

        info!(
            "Extracted {} tables from schema '{}'",
            tables.len(),
            FIXED_SCHEMA
        );
        Ok(tables)
    }

    /// Exact row count for a table.
    async fn row_count(&mut self, table: &str) -> Result<i64>;

    /// Open a cursor over the declared columns of a table, in declared order.
    async fn open_cursor<'a>(&'a mut self, table: &Table) -> Result<Box<dyn RowCursor + 'a>>;

    /// Round-trip a trivial query.
    async fn ping(&mut self) -> Result<()>;
}
