//! Configuration validation
//!
//! Validates config consistency:
//! - Listener settings are usable
//! - Broker URL and topology names are present
//! - Every resource template has exactly one replica slot and at least one replica
//! - Relay queries are known and their columns exist in the field dictionary

use std::collections::HashSet;

use analyzer_protocol::query_columns;

use crate::Config;
use crate::broker::BrokerKind;
use crate::error::{ConfigError, Result};

/// Replica slot in a queue name template
const SLOT: &str = "{}";

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(config)?;
    validate_broker(config)?;
    validate_resources(config)?;
    validate_relay(config)?;
    validate_dictionary(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    let server = &config.server;
    if server.host.is_empty() {
        return Err(ConfigError::missing_field("server", "listener", "host"));
    }
    if server.port == 0 {
        return Err(ConfigError::invalid_value(
            "server",
            "listener",
            "port",
            "must not be 0",
        ));
    }
    if server.max_line_size == 0 {
        return Err(ConfigError::invalid_value(
            "server",
            "listener",
            "max_line_size",
            "must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_broker(config: &Config) -> Result<()> {
    let broker = &config.broker;
    if broker.kind == BrokerKind::Amqp && broker.url.is_empty() {
        return Err(ConfigError::missing_field("broker", "amqp", "url"));
    }

    for (field, value) in [
        ("output_exchange", &broker.output_exchange),
        ("input_exchange", &broker.input_exchange),
        ("results_queue", &broker.results_queue),
    ] {
        if value.is_empty() {
            return Err(ConfigError::missing_field("broker", "topology", field));
        }
    }

    if broker.prefetch == 0 {
        return Err(ConfigError::invalid_value(
            "broker",
            "consumer",
            "prefetch",
            "must be at least 1",
        ));
    }
    Ok(())
}

fn validate_resources(config: &Config) -> Result<()> {
    let mut queues = HashSet::new();

    for (resource, target) in config.resources.iter() {
        let format = target.name_format(resource);
        let slots = format.matches(SLOT).count();
        if slots != 1 {
            return Err(ConfigError::invalid_value(
                "resource",
                resource.as_str(),
                "name_format",
                format!("'{format}' must contain exactly one '{SLOT}', found {slots}"),
            ));
        }
        if target.replicas == 0 {
            return Err(ConfigError::invalid_value(
                "resource",
                resource.as_str(),
                "replicas",
                "must be at least 1",
            ));
        }

        // Two resources sharing a replica queue would interleave their streams
        for i in 0..target.replicas {
            let queue = format.replacen(SLOT, &i.to_string(), 1);
            if !queues.insert(queue.clone()) {
                return Err(ConfigError::invalid_value(
                    "resource",
                    resource.as_str(),
                    "name_format",
                    format!("queue '{queue}' is already used by another resource"),
                ));
            }
            if queue == config.broker.results_queue {
                return Err(ConfigError::invalid_value(
                    "resource",
                    resource.as_str(),
                    "name_format",
                    format!("replica queue '{queue}' collides with the results queue"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_relay(config: &Config) -> Result<()> {
    let relay = &config.relay;
    if relay.queries.is_empty() {
        return Err(ConfigError::invalid_value(
            "relay",
            "queries",
            "queries",
            "at least one query is required",
        ));
    }

    let mut seen = HashSet::new();
    for &query in &relay.queries {
        if query_columns(query).is_none() {
            return Err(ConfigError::invalid_value(
                "relay",
                "queries",
                "queries",
                format!("query {query} has no result projection"),
            ));
        }
        if !seen.insert(query) {
            return Err(ConfigError::invalid_value(
                "relay",
                "queries",
                "queries",
                format!("query {query} is listed twice"),
            ));
        }
    }

    if relay.eof_copies == 0 {
        return Err(ConfigError::invalid_value(
            "relay",
            "eof",
            "eof_copies",
            "must be at least 1",
        ));
    }
    Ok(())
}

fn validate_dictionary(config: &Config) -> Result<()> {
    let dictionary = config.dictionary.build()?;

    for &query in &config.relay.queries {
        for column in query_columns(query).unwrap_or_default() {
            if !dictionary.contains(column) {
                return Err(ConfigError::invalid_value(
                    "dictionary",
                    "fields",
                    "fields",
                    format!("query {query} needs field '{column}'"),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
