//! PostgreSQL (Xata) source operations.

use std::pin::Pin;

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio_postgres::{Client, Portal, RowStream, Transaction};
use tracing::debug;

use super::{Column, RowCursor, SourceReader, Table, TextRow};
use crate::error::Result;
use crate::identifier::{qualify_table, quote_ident, FIXED_SCHEMA};

/// Source reader over a single PostgreSQL connection.
pub struct PgSource {
    client: Client,
    fetch_size: i32,
}

impl PgSource {
    /// Wrap a connected client.
    ///
    /// `fetch_size` is the number of rows each cursor round trip pulls; it
    /// bounds the rows held in memory during a transfer.
    pub fn new(client: Client, fetch_size: usize) -> Self {
        Self {
            client,
            fetch_size: i32::try_from(fetch_size).unwrap_or(i32::MAX).max(1),
        }
    }
}

#[async_trait]
impl SourceReader for PgSource {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let query = r#"
            SELECT tablename
            FROM pg_catalog.pg_tables
            WHERE schemaname = $1
        "#;

        let rows = self.client.query(query, &[&FIXED_SCHEMA]).await?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn load_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        // format_type renders DDL-ready names ("text[]", "character varying(64)")
        // where information_schema would only say "ARRAY" or "character varying".
        let query = r#"
            SELECT
                a.attname,
                format_type(a.atttypid, a.atttypmod),
                a.attnotnull,
                pg_get_expr(d.adbin, d.adrelid)
            FROM pg_catalog.pg_attribute a
            JOIN pg_catalog.pg_class c ON a.attrelid = c.oid
            JOIN pg_catalog.pg_namespace n ON c.relnamespace = n.oid
            LEFT JOIN pg_catalog.pg_attrdef d ON a.attrelid = d.adrelid AND a.attnum = d.adnum
            WHERE n.nspname = $1
              AND c.relname = $2
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;

        let rows = self.client.query(query, &[&FIXED_SCHEMA, &table]).await?;

        let columns = rows
            .iter()
            .map(|row| Column {
                name: row.get(0),
                data_type: row.get(1),
                is_nullable: !row.get::<_, bool>(2),
                default: row.get(3),
            })
            .collect();
        Ok(columns)
    }

    async fn load_primary_key(&mut self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
              AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
              AND tc.table_schema::text = $1
              AND tc.table_name::text = $2
            ORDER BY kcu.ordinal_position
        "#;

        let rows = self.client.query(query, &[&FIXED_SCHEMA, &table]).await?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn row_count(&mut self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*)::int8 FROM {}", qualify_table(table));
        let row = self.client.query_one(query.as_str(), &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn open_cursor<'a>(&'a mut self, table: &Table) -> Result<Box<dyn RowCursor + 'a>> {
        let query = select_sql(table);
        debug!("Opening cursor: {}", query);

        let fetch_size = self.fetch_size;
        let tx = self
            .client
            .build_transaction()
            .read_only(true)
            .start()
            .await?;
        let statement = tx.prepare(&query).await?;
        let portal = tx.bind(&statement, &[]).await?;

        Ok(Box::new(PgRowCursor {
            tx,
            portal,
            window: FetchWindow::new(fetch_size),
            batch: None,
        }))
    }

    async fn ping(&mut self) -> Result<()> {
        self.client.simple_query("SELECT 1").await?;
        Ok(())
    }
}

/// Build the cursor query for a table.
///
/// Selects exactly the declared columns in declared order, each cast to
/// `text` so values of any type travel in their output representation.
pub fn select_sql(table: &Table) -> String {
    let cols = table
        .columns
        .iter()
        .map(|c| format!("{}::text", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}", cols, qualify_table(&table.name))
}

/// Portal bookkeeping: how many rows the open batch has produced and
/// whether the portal has run dry.
///
/// A batch shorter than `fetch_size` means the server had nothing left. A
/// full batch says nothing, so when the row count is an exact multiple of
/// `fetch_size` one more (empty) batch is needed to see the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FetchWindow {
    fetch_size: i32,
    batch_rows: i32,
    exhausted: bool,
}

impl FetchWindow {
    fn new(fetch_size: i32) -> Self {
        Self {
            fetch_size,
            batch_rows: 0,
            exhausted: false,
        }
    }

    fn batch_started(&mut self) {
        self.batch_rows = 0;
    }

    fn row_received(&mut self) {
        self.batch_rows += 1;
    }

    fn batch_ended(&mut self) {
        if self.batch_rows < self.fetch_size {
            self.exhausted = true;
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Forward-only cursor over a bound portal inside a read-only transaction.
///
/// Rows are pulled from the server `fetch_size` at a time; only the current
/// batch is ever buffered. The transaction is rolled back when the cursor is
/// dropped.
pub struct PgRowCursor<'a> {
    tx: Transaction<'a>,
    portal: Portal,
    window: FetchWindow,
    batch: Option<Pin<Box<RowStream>>>,
}

#[async_trait]
impl<'a> RowCursor for PgRowCursor<'a> {
    async fn advance(&mut self) -> Result<Option<TextRow>> {
        loop {
            if self.window.is_exhausted() {
                return Ok(None);
            }

            if self.batch.is_none() {
                let stream = self
                    .tx
                    .query_portal_raw(&self.portal, self.window.fetch_size)
                    .await?;
                self.batch = Some(Box::pin(stream));
                self.window.batch_started();
            }

            let next = match self.batch.as_mut() {
                Some(stream) => stream.try_next().await?,
                None => None,
            };

            match next {
                Some(row) => {
                    self.window.row_received();
                    let mut values = Vec::with_capacity(row.len());
                    for idx in 0..row.len() {
                        values.push(row.try_get::<_, Option<String>>(idx)?);
                    }
                    return Ok(Some(values));
                }
                None => {
                    self.batch = None;
                    self.window.batch_ended();
                }
            }
        }
    }
}
