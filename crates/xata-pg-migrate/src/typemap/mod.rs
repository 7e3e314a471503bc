//! Column type and default sanitization for a vanilla PostgreSQL destination.
//!
//! Xata columns can carry defaults that reference its private schema or cast
//! to private types, and sequence defaults that point at sequences the
//! destination does not have. Both are normalized here, before any DDL is
//! generated. Nothing in this module performs I/O or fails.

use crate::source::{Column, Table};
use tracing::debug;

/// Name of the platform-private schema.
pub const PRIVATE_SCHEMA: &str = "xata_private";

/// Prefix of casts to platform-private types.
pub const PRIVATE_CAST: &str = "::xata_";

/// Marker of a sequence-backed default.
const NEXTVAL: &str = "nextval(";

/// Whether a default expression references platform-private objects.
pub fn is_private_default(default: &str) -> bool {
    default.contains(PRIVATE_SCHEMA) || default.contains(PRIVATE_CAST)
}

/// Map an integer type to its auto-increment counterpart.
///
/// Returns `None` for anything outside the integer and bigint families so
/// other types are never narrowed.
pub fn serial_type_for(data_type: &str) -> Option<&'static str> {
    if data_type.starts_with("integer") || data_type == "int4" {
        Some("SERIAL")
    } else if data_type.starts_with("bigint") || data_type == "int8" {
        Some("BIGSERIAL")
    } else {
        None
    }
}

/// Sanitize one column.
///
/// 1. A default referencing the private schema or a private cast is dropped.
/// 2. A surviving `nextval(` default on an integer/bigint column turns the
///    column into `SERIAL`/`BIGSERIAL` and drops the default; the destination
///    creates its own sequence.
///
/// Rule 1 runs first so rule 2 only sees defaults that survived it.
pub fn sanitize_column(mut col: Column) -> Column {
    if col.default.as_deref().is_some_and(is_private_default) {
        debug!(
            "Dropping platform-private default on column {}: {:?}",
            col.name, col.default
        );
        col.default = None;
    }

    if col.default.as_deref().is_some_and(|d| d.contains(NEXTVAL)) {
        if let Some(serial) = serial_type_for(&col.data_type) {
            debug!(
                "Rewriting sequence default on column {} ({} -> {})",
                col.name, col.data_type, serial
            );
            col.data_type = serial.to_string();
            col.default = None;
        }
    }

    col
}

/// Sanitize every column of every table in place.
pub fn sanitize_tables(tables: &mut [Table]) {
    for table in tables.iter_mut() {
        let columns = std::mem::take(&mut table.columns);
        table.columns = columns.into_iter().map(sanitize_column).collect();
    }
}
