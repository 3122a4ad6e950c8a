//! Field dictionary
//!
//! Bijection between field names and the small integer ids used in encoded
//! records. Every pipeline stage shares the same table; the gateway builds it
//! once at startup and shares it behind an `Arc`.

use std::collections::HashMap;

use crate::error::DictionaryError;

/// Field names in id order, shared by every stage
pub const STANDARD_FIELDS: [&str; 18] = [
    // movies
    "id",
    "title",
    "release_date",
    "overview",
    "budget",
    "revenue",
    "genres",
    "production_countries",
    "spoken_languages",
    // ratings
    "movieId",
    "rating",
    "timestamp",
    // credits
    "cast",
    // derived by stages
    "rate_revenue_budget",
    "sentiment",
    "country",
    "actor",
    "count",
];

/// Immutable name ↔ id map
///
/// Ids are dense: `0..len()`, each with exactly one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDictionary {
    names: Vec<String>,
    ids: HashMap<String, u16>,
}

impl FieldDictionary {
    /// Build from names in id order
    pub fn new<I, S>(names: I) -> Result<Self, DictionaryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(DictionaryError::Empty);
        }
        if names.len() > u16::MAX as usize + 1 {
            return Err(DictionaryError::TooLarge(names.len()));
        }

        let mut ids = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            if name.trim().is_empty() || name.contains([';', '=', '\n']) {
                return Err(DictionaryError::InvalidName(name.clone()));
            }
            if ids.insert(name.clone(), id as u16).is_some() {
                return Err(DictionaryError::Duplicate(name.clone()));
            }
        }

        Ok(Self { names, ids })
    }

    /// The dictionary every stage ships with
    pub fn standard() -> Self {
        let names: Vec<String> = STANDARD_FIELDS.iter().map(|s| s.to_string()).collect();
        let ids = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id as u16))
            .collect();
        Self { names, ids }
    }

    /// Id for a field name
    #[inline]
    pub fn id(&self, name: &str) -> Option<u16> {
        self.ids.get(name).copied()
    }

    /// Field name for an id
    #[inline]
    pub fn name(&self, id: u16) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    /// True if the name has an id
    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false for a constructed dictionary
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in id order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for FieldDictionary {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_is_bijective() {
        let dict = FieldDictionary::standard();
        assert_eq!(dict.len(), STANDARD_FIELDS.len());
        for id in 0..dict.len() as u16 {
            let name = dict.name(id).unwrap();
            assert_eq!(dict.id(name), Some(id));
        }
        assert_eq!(dict.id("id"), Some(0));
        assert_eq!(dict.id("genres"), Some(6));
        assert_eq!(dict.id("count"), Some(17));
        assert_eq!(dict.name(18), None);
    }

    #[test]
    fn test_standard_matches_new() {
        assert_eq!(
            FieldDictionary::new(STANDARD_FIELDS).unwrap(),
            FieldDictionary::standard()
        );
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(
            FieldDictionary::new(Vec::<String>::new()),
            Err(DictionaryError::Empty)
        );
    }

    #[test]
    fn test_rejects_duplicates() {
        assert_eq!(
            FieldDictionary::new(["id", "title", "id"]),
            Err(DictionaryError::Duplicate("id".into()))
        );
    }

    #[test]
    fn test_rejects_separator_names() {
        assert!(matches!(
            FieldDictionary::new(["id", "a;b"]),
            Err(DictionaryError::InvalidName(_))
        ));
        assert!(matches!(
            FieldDictionary::new(["id", "  "]),
            Err(DictionaryError::InvalidName(_))
        ));
    }

    #[test]
    fn test_names_in_id_order() {
        let dict = FieldDictionary::new(["b", "a"]).unwrap();
        assert_eq!(dict.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(dict.id("a"), Some(1));
        assert!(dict.contains("b"));
        assert!(!dict.contains("c"));
    }
}
