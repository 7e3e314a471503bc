//! COPY text-format encoding.

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Sink, SinkExt};

use crate::error::{MigrateError, Result};
use crate::identifier::{qualify_table, quote_list};
use crate::source::{RowCursor, TextRow};

/// Generate the `COPY ... FROM STDIN` statement for a table.
pub fn copy_in_sql(table: &str, columns: &[String]) -> String {
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
        qualify_table(table),
        quote_list(columns)
    )
}

/// Escape special characters for COPY text format.
///
/// Backslash, tab, newline and carriage return are the only bytes that can
/// break a text-format line.
pub fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

/// Append one row as a tab-separated, newline-terminated COPY line.
pub fn encode_copy_row(buf: &mut BytesMut, row: &TextRow) {
    for (i, value) in row.iter().enumerate() {
        if i > 0 {
            buf.put_u8(b'\t');
        }
        match value {
            Some(text) => buf.extend_from_slice(escape_copy_text(text).as_bytes()),
            None => buf.extend_from_slice(b"\\N"),
        }
    }
    buf.put_u8(b'\n');
}

/// Pull rows from `rows` and hand each one to `sink` as an encoded line.
///
/// The next row is requested only after the previous line was accepted by
/// the sink. Rows whose width differs from `columns` stop the copy. Returns
/// the number of rows sent; the caller finishes the sink.
pub async fn feed_rows<K>(
    sink: &mut K,
    table: &str,
    columns: &[String],
    rows: &mut dyn RowCursor,
) -> Result<u64>
where
    K: Sink<Bytes> + Unpin,
    MigrateError: From<K::Error>,
{
    // Reused for every row; split() hands the encoded line to the sink
    // and keeps the allocation.
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut sent: u64 = 0;

    while let Some(row) = rows.advance().await? {
        if row.len() != columns.len() {
            return Err(MigrateError::transfer(
                table,
                format!(
                    "row has {} values but {} columns were declared",
                    row.len(),
                    columns.len()
                ),
            ));
        }
        encode_copy_row(&mut buf, &row);
        // feed() does not flush; the sink flushes its own buffer as it fills.
        sink.feed(buf.split().freeze()).await?;
        sent += 1;
    }

    Ok(sent)
}
