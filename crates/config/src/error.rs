//! Configuration errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use analyzer_protocol::DictionaryError;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Why a configuration could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value the gateway cannot run without is absent or empty
    #[error("{section} '{name}' is missing required field '{field}'")]
    MissingField {
        section: &'static str,
        name: String,
        field: &'static str,
    },

    /// A value is present but out of range or inconsistent
    #[error("{section} '{name}' has invalid {field}: {message}")]
    InvalidValue {
        section: &'static str,
        name: String,
        field: &'static str,
        message: String,
    },

    /// `[dictionary] fields` does not form a usable dictionary
    #[error("invalid field dictionary: {0}")]
    Dictionary(#[from] DictionaryError),
}

impl ConfigError {
    pub fn missing_field(section: &'static str, name: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            section,
            name: name.into(),
            field,
        }
    }

    pub fn invalid_value(
        section: &'static str,
        name: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            section,
            name: name.into(),
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_setting() {
        let err = ConfigError::missing_field("broker", "amqp", "url");
        assert_eq!(err.to_string(), "broker 'amqp' is missing required field 'url'");

        let err = ConfigError::invalid_value("resource", "movies", "replicas", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "resource 'movies' has invalid replicas: must be at least 1"
        );
    }

    #[test]
    fn test_dictionary_error_wrapped() {
        let err: ConfigError = DictionaryError::Duplicate("title".into()).into();
        assert_eq!(
            err.to_string(),
            "invalid field dictionary: field 'title' appears more than once"
        );
    }
}
