//! Analyzer Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! An empty file is a valid config for a single-replica deployment next to a
//! broker reachable as `rabbitmq`.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use analyzer_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[resources.ratings]\nreplicas = 3").unwrap();
//! assert_eq!(config.resources.ratings.replicas, 3);
//! ```
//!
//! # Example Full Config
//!
//! See `configs/gateway.toml` for all available options.

mod broker;
mod error;
mod logging;
mod pipeline;
mod server;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use analyzer_protocol::FieldDictionary;

pub use broker::{BrokerConfig, BrokerKind};
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use pipeline::{
    DictionaryConfig, IngestConfig, LineFormat, RelayConfig, ResourceTarget, ResourcesConfig,
};
pub use server::ServerConfig;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Client-facing listener
    pub server: ServerConfig,

    /// Broker connection and topology names
    pub broker: BrokerConfig,

    /// Replica sets each resource is published to
    pub resources: ResourcesConfig,

    /// Ingest loop behaviour
    pub ingest: IngestConfig,

    /// Result relay behaviour
    pub relay: RelayConfig,

    /// Field dictionary override
    pub dictionary: DictionaryConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Field dictionary shared by every stage
    pub fn field_dictionary(&self) -> Result<FieldDictionary> {
        Ok(self.dictionary.build()?)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
