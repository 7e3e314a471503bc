//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Environment variable holding the source (Xata) connection URL.
pub const SOURCE_URL_ENV: &str = "XATA_DATABASE_URL";

/// Environment variable holding the destination connection URL.
pub const TARGET_URL_ENV: &str = "DATABASE_URL";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source database (Xata) configuration.
    #[serde(default)]
    pub source: EndpointConfig,

    /// Destination database (PostgreSQL) configuration.
    #[serde(default)]
    pub target: EndpointConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Connection settings for one endpoint.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// libpq-style connection URL or key/value string.
    #[serde(default)]
    pub url: String,

    /// TLS mode: disable, prefer, require, verify-ca or verify-full.
    /// Derived from the URL's `sslmode` when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<String>,
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("url", &redact_url(&self.url))
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows fetched from the source cursor per round trip.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    /// Compare source and destination row counts after each table is copied.
    #[serde(default)]
    pub verify_row_counts: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            fetch_size: default_fetch_size(),
            verify_row_counts: false,
        }
    }
}

fn default_fetch_size() -> usize {
    1000
}

/// Replace the password in a connection string with `[REDACTED]`.
///
/// Handles both URL form (`postgres://user:pw@host/db`) and key/value form
/// (`host=... password=pw`).
pub fn redact_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let rest = &url[scheme_end + 3..];
        let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
        if let Some(at) = rest[..authority_end].rfind('@') {
            let userinfo = &rest[..at];
            if let Some(colon) = userinfo.find(':') {
                return format!(
                    "{}{}:[REDACTED]{}",
                    &url[..scheme_end + 3],
                    &userinfo[..colon],
                    &rest[at..]
                );
            }
        }
        return url.to_string();
    }

    url.split_whitespace()
        .map(|pair| {
            if pair.starts_with("password=") {
                "password=[REDACTED]".to_string()
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
