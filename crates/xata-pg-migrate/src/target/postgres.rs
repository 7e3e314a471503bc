//! PostgreSQL destination operations.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_postgres::Client;
use tracing::debug;

use super::{copy_in_sql, feed_rows, TargetWriter};
use crate::error::Result;
use crate::identifier::qualify_table;
use crate::source::RowCursor;

/// Destination writer over a single PostgreSQL connection.
pub struct PgTarget {
    client: Client,
}

impl PgTarget {
    /// Wrap a connected client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TargetWriter for PgTarget {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn copy_in(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &mut dyn RowCursor,
    ) -> Result<u64> {
        let copy_sql = copy_in_sql(table, columns);
        debug!("{}", copy_sql);

        let sink = self.client.copy_in::<_, Bytes>(copy_sql.as_str()).await?;
        futures::pin_mut!(sink);

        let sent = feed_rows(&mut sink, table, columns, rows).await?;

        let copied = sink.finish().await?;
        debug!("COPY into {} sent {} rows, server accepted {}", table, sent, copied);
        Ok(copied)
    }

    async fn row_count(&mut self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*)::int8 FROM {}", qualify_table(table));
        let row = self.client.query_one(query.as_str(), &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn ping(&mut self) -> Result<()> {
        self.client.simple_query("SELECT 1").await?;
        Ok(())
    }
}
