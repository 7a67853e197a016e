//! Free-form attribute bag attached to candidates and Persons.
//!
//! Keys starting with [`RESERVED_PREFIX`] are engine metadata (import
//! source, row hints); everything else is form data entered by the
//! submitter. Only form data is ever persisted as reusable profile data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix marking a key as internal metadata rather than form data.
pub const RESERVED_PREFIX: &str = "__";

/// Ordered string-to-string attribute map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeBag(BTreeMap<String, String>);

impl AttributeBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is reserved metadata.
    #[must_use]
    pub fn is_reserved(key: &str) -> bool {
        key.starts_with(RESERVED_PREFIX)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All entries, metadata included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Submitter-entered entries only.
    pub fn form_data(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(k, _)| !Self::is_reserved(k))
    }

    /// Engine metadata entries only.
    pub fn metadata(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(k, _)| Self::is_reserved(k))
    }

    /// Form data restricted to `allowed` keys, with blank values dropped.
    #[must_use]
    pub fn form_data_for_keys(&self, allowed: &[String]) -> AttributeBag {
        self.form_data()
            .filter(|(k, v)| !v.trim().is_empty() && allowed.iter().any(|a| a == k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl FromIterator<(String, String)> for AttributeBag {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for AttributeBag {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag() -> AttributeBag {
        let mut bag = AttributeBag::new();
        bag.insert("shirt_size", "M");
        bag.insert("diet", "");
        bag.insert("__source", "xlsx");
        bag.insert("__row_hint", "12");
        bag
    }

    #[test]
    fn test_form_data_excludes_reserved() {
        let b = bag();
        let keys: Vec<&str> = b.form_data().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["diet", "shirt_size"]);
    }

    #[test]
    fn test_metadata_only_reserved() {
        let b = bag();
        let keys: Vec<&str> = b.metadata().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["__row_hint", "__source"]);
    }

    #[test]
    fn test_form_data_for_keys_filters_unknown_and_blank() {
        let allowed = vec!["shirt_size".to_string(), "diet".to_string(), "__source".to_string()];
        let filtered = bag().form_data_for_keys(&allowed);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("shirt_size"), Some("M"));
        assert_eq!(filtered.get("__source"), None);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let mut bag = AttributeBag::new();
        bag.insert("a", "1");
        assert_eq!(serde_json::to_string(&bag).unwrap(), r#"{"a":"1"}"#);
    }
}
