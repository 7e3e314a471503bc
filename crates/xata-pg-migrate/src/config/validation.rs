//! Configuration validation.

use super::{Config, EndpointConfig, SOURCE_URL_ENV, TARGET_URL_ENV};
use crate::error::{MigrateError, Result};

const SSL_MODES: &[&str] = &["disable", "prefer", "require", "verify-ca", "verify-full"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let source = validate_endpoint(&config.source, "source", SOURCE_URL_ENV)?;
    let target = validate_endpoint(&config.target, "target", TARGET_URL_ENV)?;

    // Cannot migrate into the database we are reading from
    if source.get_hosts() == target.get_hosts()
        && source.get_ports() == target.get_ports()
        && source.get_dbname() == target.get_dbname()
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    if config.migration.fetch_size == 0 {
        return Err(MigrateError::Config(
            "migration.fetch_size must be at least 1".into(),
        ));
    }
    if config.migration.fetch_size > i32::MAX as usize {
        return Err(MigrateError::Config(format!(
            "migration.fetch_size must not exceed {}",
            i32::MAX
        )));
    }

    Ok(())
}

fn validate_endpoint(
    endpoint: &EndpointConfig,
    role: &str,
    env_var: &str,
) -> Result<tokio_postgres::Config> {
    if endpoint.url.trim().is_empty() {
        return Err(MigrateError::Config(format!(
            "{} is not set (required for the {} database)",
            env_var, role
        )));
    }

    let parsed: tokio_postgres::Config = endpoint.url.parse().map_err(|e| {
        MigrateError::Config(format!("{} connection string is invalid: {}", role, e))
    })?;

    if let Some(ref mode) = endpoint.ssl_mode {
        if !SSL_MODES.contains(&mode.to_lowercase().as_str()) {
            return Err(MigrateError::Config(format!(
                "{}.ssl_mode '{}' is invalid. Valid values: {}",
                role,
                mode,
                SSL_MODES.join(", ")
            )));
        }
    }

    Ok(parsed)
}
