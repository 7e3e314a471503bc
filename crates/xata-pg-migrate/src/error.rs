//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration errors (missing URLs, invalid YAML).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when either endpoint cannot be reached.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for catalog introspection failures.
pub const EXIT_INTROSPECTION_ERROR: u8 = 3;
/// Exit code for destination DDL failures.
pub const EXIT_SCHEMA_ERROR: u8 = 4;
/// Exit code for row transfer failures.
pub const EXIT_TRANSFER_ERROR: u8 = 5;
/// Exit code for row count mismatches.
pub const EXIT_VALIDATION_ERROR: u8 = 6;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code after SIGINT/SIGTERM.
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing connection URL, invalid YAML, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Endpoint unreachable at startup
    #[error("Connection to {endpoint} database failed: {message}")]
    Connection { endpoint: String, message: String },

    /// Catalog query failed while building the schema snapshot
    #[error("Schema introspection failed{}: {message}", table_suffix(.table))]
    Introspection {
        table: Option<String>,
        message: String,
    },

    /// Drop or create statement failed on the destination
    #[error("Schema apply failed for table {table}: {message}")]
    SchemaApply { table: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Data transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Row count validation failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Driver error that has not been attributed to a phase yet
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

fn table_suffix(table: &Option<String>) -> String {
    match table {
        Some(t) => format!(" for table {}", t),
        None => String::new(),
    }
}

impl MigrateError {
    /// Create a Connection error for the named endpoint.
    pub fn connection(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        MigrateError::Connection {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    /// Create an Introspection error, optionally scoped to a table.
    pub fn introspection(table: Option<&str>, err: impl std::fmt::Display) -> Self {
        MigrateError::Introspection {
            table: table.map(str::to_string),
            message: err.to_string(),
        }
    }

    /// Create a SchemaApply error
    pub fn schema_apply(table: impl Into<String>, err: impl std::fmt::Display) -> Self {
        MigrateError::SchemaApply {
            table: table.into(),
            message: err.to_string(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error already names its phase.
    fn has_context(&self) -> bool {
        matches!(
            self,
            MigrateError::Config(_)
                | MigrateError::Connection { .. }
                | MigrateError::Introspection { .. }
                | MigrateError::SchemaApply { .. }
                | MigrateError::Transfer { .. }
                | MigrateError::Validation(_)
                | MigrateError::Cancelled
        )
    }

    /// Attach introspection context to an error raised while reading the catalog.
    ///
    /// Errors that already carry context (or cancellation) pass through.
    pub fn in_introspection(self, table: Option<&str>) -> Self {
        if self.has_context() {
            self
        } else {
            MigrateError::introspection(table, self)
        }
    }

    /// See [`MigrateError::in_introspection`].
    pub fn in_schema_apply(self, table: &str) -> Self {
        if self.has_context() {
            self
        } else {
            MigrateError::schema_apply(table, self)
        }
    }

    /// See [`MigrateError::in_introspection`].
    pub fn in_transfer(self, table: &str) -> Self {
        if self.has_context() {
            self
        } else {
            MigrateError::transfer(table, self.to_string())
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Introspection { .. } => EXIT_INTROSPECTION_ERROR,
            MigrateError::SchemaApply { .. } => EXIT_SCHEMA_ERROR,
            MigrateError::Transfer { .. } | MigrateError::Database(_) => EXIT_TRANSFER_ERROR,
            MigrateError::Validation(_) => EXIT_VALIDATION_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_introspection_message_names_table() {
        let err = MigrateError::introspection(Some("users"), "relation does not exist");
        assert_eq!(
            err.to_string(),
            "Schema introspection failed for table users: relation does not exist"
        );

        let err = MigrateError::introspection(None, "permission denied");
        assert_eq!(
            err.to_string(),
            "Schema introspection failed: permission denied"
        );
    }

    #[test]
    fn test_exit_codes_are_distinct_per_phase() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::connection("source", "refused").exit_code(),
            EXIT_CONNECTION_ERROR
        );
        assert_eq!(
            MigrateError::introspection(None, "x").exit_code(),
            EXIT_INTROSPECTION_ERROR
        );
        assert_eq!(
            MigrateError::schema_apply("t", "x").exit_code(),
            EXIT_SCHEMA_ERROR
        );
        assert_eq!(MigrateError::transfer("t", "x").exit_code(), EXIT_TRANSFER_ERROR);
        assert_eq!(MigrateError::Cancelled.exit_code(), EXIT_CANCELLED);
    }

    #[test]
    fn test_phase_context_keeps_existing_context() {
        let err = MigrateError::transfer("orders", "COPY rejected").in_schema_apply("users");
        assert!(matches!(err, MigrateError::Transfer { ref table, .. } if table == "orders"));

        let err = MigrateError::Cancelled.in_transfer("users");
        assert!(matches!(err, MigrateError::Cancelled));
    }

    #[test]
    fn test_phase_context_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = MigrateError::from(io).in_transfer("users");
        match err {
            MigrateError::Transfer { table, message } => {
                assert_eq!(table, "users");
                assert!(message.contains("pipe closed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_format_detailed_starts_with_message() {
        let err = MigrateError::schema_apply("users", "syntax error at or near \"(\"");
        assert!(err
            .format_detailed()
            .starts_with("Error: Schema apply failed for table users"));
    }
}
