//! Pipeline-facing configuration
//!
//! Where each uploaded resource goes, how lines are forwarded, which query
//! results the gateway waits for and which field dictionary every stage
//! shares.

use serde::Deserialize;

use analyzer_protocol::{DictionaryError, FieldDictionary, Resource};

/// Replica set a resource is published to
///
/// # Example
///
/// ```toml
/// [resources.ratings]
/// name_format = "ratings-{}"
/// replicas = 4
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceTarget {
    /// Queue name template with one `{}` replica slot
    /// Default: "<resource>-{}"
    pub name_format: Option<String>,

    /// Number of replicas of the first stage reading this resource
    /// Default: 1
    pub replicas: usize,
}

impl Default for ResourceTarget {
    fn default() -> Self {
        Self {
            name_format: None,
            replicas: 1,
        }
    }
}

impl ResourceTarget {
    /// Name template, falling back to the resource's own name
    pub fn name_format(&self, resource: Resource) -> String {
        self.name_format
            .clone()
            .unwrap_or_else(|| format!("{resource}-{{}}"))
    }
}

/// Targets for all three resources
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesConfig {
    pub movies: ResourceTarget,
    pub credits: ResourceTarget,
    pub ratings: ResourceTarget,
}

impl ResourcesConfig {
    pub fn get(&self, resource: Resource) -> &ResourceTarget {
        match resource {
            Resource::Movies => &self.movies,
            Resource::Credits => &self.credits,
            Resource::Ratings => &self.ratings,
        }
    }

    /// Targets in resource id order
    pub fn iter(&self) -> impl Iterator<Item = (Resource, &ResourceTarget)> {
        Resource::ALL.into_iter().map(move |r| (r, self.get(r)))
    }
}

/// How client lines are turned into envelope lines
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LineFormat {
    /// Decode each line as a record and re-encode it (default)
    #[default]
    Record,
    /// Forward lines byte for byte; the first stage parses CSV itself
    Raw,
}

/// Ingest loop configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub line_format: LineFormat,

    /// Split a client batch into envelopes of at most this many lines
    /// Default: 0 (one envelope per client batch)
    pub max_envelope_lines: usize,
}

/// Result relay configuration
///
/// # Example
///
/// ```toml
/// [relay]
/// queries = [1, 2, 3, 4, 5]
/// eof_copies = 1
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Query ids the client expects results for
    pub queries: Vec<u8>,

    /// EOF envelopes to collect per query before the client is told it ended
    pub eof_copies: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queries: vec![1, 2, 3, 4, 5],
            eof_copies: 1,
        }
    }
}

/// Field dictionary override
///
/// ```toml
/// [dictionary]
/// fields = ["id", "title", "genres"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    /// Field names in id order; the standard table when absent
    pub fields: Option<Vec<String>>,
}

impl DictionaryConfig {
    pub fn build(&self) -> Result<FieldDictionary, DictionaryError> {
        match &self.fields {
            Some(fields) => FieldDictionary::new(fields.iter().cloned()),
            None => Ok(FieldDictionary::standard()),
        }
    }
}
