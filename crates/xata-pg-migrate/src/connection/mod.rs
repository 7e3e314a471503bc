//! Single-client connections to the source and destination.
//!
//! Each endpoint gets exactly one [`tokio_postgres::Client`], opened at
//! startup and held for the whole run. There is no pooling and no reconnect.

mod tls;

pub use tls::{build_connector, SslMode};

use std::time::Instant;

use tokio_postgres::Client;
use tracing::{error, info, warn};

use crate::config::{redact_url, EndpointConfig};
use crate::error::{MigrateError, Result};

/// Which side of the migration a connection serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The Xata database being read.
    Source,
    /// The PostgreSQL database being written.
    Target,
}

impl Endpoint {
    /// Label used in log lines and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Source => "source",
            Endpoint::Target => "target",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open and verify a connection to one endpoint.
///
/// The connection driver runs on its own task; it ends when the returned
/// client is dropped.
pub async fn connect(config: &EndpointConfig, endpoint: Endpoint) -> Result<Client> {
    let mut pg_config: tokio_postgres::Config = config
        .url
        .parse()
        .map_err(|e| MigrateError::Config(format!("{} connection string is invalid: {}", endpoint, e)))?;

    let ssl_mode = SslMode::resolve(config.ssl_mode.as_deref(), &pg_config)?;
    pg_config.ssl_mode(ssl_mode.to_pg());

    info!("Connecting to {} database ({})", endpoint, redact_url(&config.url));

    let client = match build_connector(ssl_mode)? {
        Some(tls) => {
            let (client, connection) = pg_config
                .connect(tls)
                .await
                .map_err(|e| MigrateError::connection(endpoint.as_str(), e))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("{} connection error: {}", endpoint, e);
                }
            });
            client
        }
        None => {
            warn!(
                "{} connection TLS is disabled. Credentials will be transmitted in plaintext.",
                endpoint
            );
            let (client, connection) = pg_config
                .connect(tokio_postgres::NoTls)
                .await
                .map_err(|e| MigrateError::connection(endpoint.as_str(), e))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("{} connection error: {}", endpoint, e);
                }
            });
            client
        }
    };

    let started = Instant::now();
    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| MigrateError::connection(endpoint.as_str(), e))?;

    info!(
        "Connected to {} database {:?} on {:?} ({}ms)",
        endpoint,
        pg_config.get_dbname().unwrap_or_default(),
        pg_config.get_hosts(),
        started.elapsed().as_millis()
    );

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_config_error() {
        let config = EndpointConfig {
            url: "postgres://localhost:notaport/db".to_string(),
            ssl_mode: None,
        };
        let err = connect(&config, Endpoint::Source).await.unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
        assert!(err.to_string().contains("source"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        // Port 1 on loopback refuses immediately.
        let config = EndpointConfig {
            url: "postgres://u:p@127.0.0.1:1/db?connect_timeout=2".to_string(),
            ssl_mode: Some("disable".to_string()),
        };
        let err = connect(&config, Endpoint::Target).await.unwrap_err();
        match err {
            MigrateError::Connection { endpoint, .. } => assert_eq!(endpoint, "target"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
