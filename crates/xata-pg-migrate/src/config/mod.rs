//! Configuration loading and validation.
//!
//! A [`Config`] is built once at startup from an optional YAML file, then
//! overlaid with connection URLs from the environment or command line, and
//! validated before any connection is opened.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = Self::parse_yaml(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without validating.
    ///
    /// Used when connection URLs are still to be supplied by
    /// [`Config::with_urls`].
    pub fn parse_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read a YAML file without validating.
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Build a configuration from the two connection URLs.
    pub fn from_urls(source_url: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self::default().with_urls(Some(source_url.into()), Some(target_url.into()))
    }

    /// Override connection URLs. `None` keeps the current value.
    pub fn with_urls(mut self, source_url: Option<String>, target_url: Option<String>) -> Self {
        if let Some(url) = source_url {
            self.source.url = url;
        }
        if let Some(url) = target_url {
            self.target.url = url;
        }
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
