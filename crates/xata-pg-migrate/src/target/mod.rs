//! Destination database operations and schema materialization.

mod copy;
mod postgres;

pub use copy::{copy_in_sql, encode_copy_row, escape_copy_text, feed_rows};
pub use postgres::PgTarget;

use crate::cancel::cancellable;
use crate::error::Result;
use crate::identifier::{qualify_table, quote_ident, quote_list};
use crate::source::{RowCursor, Table};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Write schema and data to the destination database.
#[async_trait]
pub trait TargetWriter: Send {
    /// Execute a statement that returns no rows.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Bulk-load rows pulled from `rows` into `table`.
    ///
    /// Rows are pulled one at a time; the next row is not requested until
    /// the previous one has been handed to the loader. Returns the number of
    /// rows the destination accepted.
    async fn copy_in(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &mut dyn RowCursor,
    ) -> Result<u64>;

    /// Exact row count for a table.
    async fn row_count(&mut self, table: &str) -> Result<i64>;

    /// Round-trip a trivial query.
    async fn ping(&mut self) -> Result<()>;
}

/// Generate `DROP TABLE` for a table, cascading to dependent objects.
pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE", qualify_table(table))
}

/// Generate `CREATE TABLE` for a sanitized table.
pub fn create_table_sql(table: &Table) -> String {
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let mut line = format!("    {} {}", quote_ident(&col.name), col.data_type);
            if !col.is_nullable {
                line.push_str(" NOT NULL");
            }
            if let Some(ref default) = col.default {
                line.push_str(" DEFAULT ");
                line.push_str(default);
            }
            line
        })
        .collect();

    if table.has_pk() {
        lines.push(format!("    PRIMARY KEY ({})", quote_list(&table.primary_key)));
    }

    format!(
        "CREATE TABLE {} (\n{}\n)",
        qualify_table(&table.name),
        lines.join(",\n")
    )
}

/// Generate the statements that move each `SERIAL` / `BIGSERIAL` sequence
/// past the highest copied value.
///
/// COPY writes explicit ids, so the sequences behind those columns would
/// otherwise still start at 1. An empty table resets its sequence to 1.
pub fn reset_sequence_sql(table: &Table) -> Vec<String> {
    let qualified = qualify_table(&table.name);
    table
        .columns
        .iter()
        .filter(|col| {
            col.data_type.eq_ignore_ascii_case("SERIAL")
                || col.data_type.eq_ignore_ascii_case("BIGSERIAL")
        })
        .map(|col| {
            let column = quote_ident(&col.name);
            format!(
                "SELECT setval(pg_get_serial_sequence({}, {}), COALESCE(MAX({}), 0) + 1, false) FROM {}",
                quote_literal(&qualified),
                quote_literal(&col.name),
                column,
                qualified
            )
        })
        .collect()
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Make the destination schema match the snapshot.
///
/// Each table is dropped (cascading) and recreated, in snapshot order. The
/// first failure stops the loop; tables already created stay in place. No
/// further statement is sent once `cancel` fires.
pub async fn apply_schema<W>(
    target: &mut W,
    tables: &[Table],
    cancel: &CancellationToken,
) -> Result<()>
where
    W: TargetWriter + ?Sized,
{
    for table in tables {
        let drop_sql = drop_table_sql(&table.name);
        debug!("{}", drop_sql);
        cancellable(cancel, target.execute(&drop_sql))
            .await
            .map_err(|e| e.in_schema_apply(&table.name))?;

        let create_sql = create_table_sql(table);
        debug!("{}", create_sql);
        cancellable(cancel, target.execute(&create_sql))
            .await
            .map_err(|e| e.in_schema_apply(&table.name))?;

        info!(
            "Created table {} ({} columns, primary key: {})",
            table.name,
            table.columns.len(),
            if table.has_pk() {
                table.primary_key.join(", ")
            } else {
                "none".to_string()
            }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Column;

    fn users() -> Table {
        Table {
            name: "users".to_string(),
            columns: vec![
                Column::new("id", "SERIAL").not_null(),
                Column::new("name", "text").not_null(),
                Column::new("note", "text"),
                Column::new("created_at", "timestamp with time zone")
                    .not_null()
                    .with_default("now()"),
            ],
            primary_key: vec!["id".to_string()],
        }
    }

    #[test]
    fn test_drop_table_sql() {
        assert_eq!(
            drop_table_sql("users"),
            "DROP TABLE IF EXISTS \"public\".\"users\" CASCADE"
        );
    }

    #[test]
    fn test_create_table_sql() {
        let expected = "CREATE TABLE \"public\".\"users\" (\n\
            \x20   \"id\" SERIAL NOT NULL,\n\
            \x20   \"name\" text NOT NULL,\n\
            \x20   \"note\" text,\n\
            \x20   \"created_at\" timestamp with time zone NOT NULL DEFAULT now(),\n\
            \x20   PRIMARY KEY (\"id\")\n\
            )";
        assert_eq!(create_table_sql(&users()), expected);
    }

    #[test]
    fn test_create_table_without_primary_key() {
        let table = Table {
            name: "audit_log".to_string(),
            columns: vec![Column::new("entry", "jsonb")],
            primary_key: Vec::new(),
        };
        let sql = create_table_sql(&table);
        assert!(!sql.contains("PRIMARY KEY"));
        assert!(sql.ends_with("\"entry\" jsonb\n)"));
    }

    #[test]
    fn test_composite_primary_key_keeps_key_order() {
        let table = Table {
            name: "memberships".to_string(),
            columns: vec![
                Column::new("org_id", "bigint").not_null(),
                Column::new("user_id", "bigint").not_null(),
            ],
            primary_key: vec!["user_id".to_string(), "org_id".to_string()],
        };
        assert!(create_table_sql(&table).contains("PRIMARY KEY (\"user_id\", \"org_id\")"));
    }

    #[test]
    fn test_array_and_parametrized_types_pass_through() {
        let table = Table {
            name: "Docs".to_string(),
            columns: vec![
                Column::new("tags", "text[]"),
                Column::new("title", "character varying(255)"),
                Column::new("score", "numeric(10,2)"),
            ],
            primary_key: Vec::new(),
        };
        let sql = create_table_sql(&table);
        assert!(sql.starts_with("CREATE TABLE \"public\".\"Docs\""));
        assert!(sql.contains("\"tags\" text[]"));
        assert!(sql.contains("\"title\" character varying(255)"));
        assert!(sql.contains("\"score\" numeric(10,2)"));
    }

    #[test]
    fn test_reset_sequence_sql_for_serial_columns() {
        let statements = reset_sequence_sql(&users());
        assert_eq!(
            statements,
            vec![
                "SELECT setval(pg_get_serial_sequence('\"public\".\"users\"', 'id'), \
                 COALESCE(MAX(\"id\"), 0) + 1, false) FROM \"public\".\"users\""
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_reset_sequence_sql_skips_plain_columns() {
        let table = Table {
            name: "tags".to_string(),
            columns: vec![
                Column::new("id", "bigint").not_null(),
                Column::new("seq", "bigserial").not_null(),
            ],
            primary_key: Vec::new(),
        };
        let statements = reset_sequence_sql(&table);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("'seq'"));
        assert!(statements[0].contains("MAX(\"seq\")"));
    }

    #[test]
    fn test_reset_sequence_sql_escapes_quotes_in_names() {
        let table = Table {
            name: "o'brien".to_string(),
            columns: vec![Column::new("it's", "SERIAL").not_null()],
            primary_key: Vec::new(),
        };
        let sql = &reset_sequence_sql(&table)[0];
        assert!(sql.contains("pg_get_serial_sequence('\"public\".\"o''brien\"', 'it''s')"));
    }
}
