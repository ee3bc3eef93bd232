//! Manifest record.
//!
//! The manifest is a JSON object mapping every persisted key to its marker,
//! written most recently used first: `{"b":2,"a":1}`. It is the source of
//! truth for which item records are valid.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;

/// Ordered `(key, marker)` pairs, most recently used first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<(String, i64)>,
}

impl Manifest {
    pub fn new(entries: Vec<(String, i64)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, i64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Entries by ascending marker; equal markers keep least recently used
    /// first.
    pub fn oldest_first(self) -> Vec<(String, i64)> {
        let mut entries = self.entries;
        entries.reverse();
        entries.sort_by_key(|(_, marker)| *marker);
        entries
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(key, marker)| (key, marker)))
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(ManifestVisitor)
    }
}

/// Keeps document order, which a map type would lose.
struct ManifestVisitor;

impl<'de> Visitor<'de> for ManifestVisitor {
    type Value = Manifest;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object of key to integer marker")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Manifest, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, marker)) = map.next_entry::<String, i64>()? {
            entries.push((key, marker));
        }
        Ok(Manifest { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(pairs: &[(&str, i64)]) -> Manifest {
        Manifest::new(pairs.iter().map(|(k, m)| (k.to_string(), *m)).collect())
    }

    #[test]
    fn test_manifest_json_keeps_order() {
        let json = manifest(&[("b", 2), ("a", 1), ("c", 7)]).to_json().unwrap();
        assert_eq!(json, r#"{"b":2,"a":1,"c":7}"#);

        let parsed = Manifest::parse(&json).unwrap();
        assert_eq!(parsed, manifest(&[("b", 2), ("a", 1), ("c", 7)]));
    }

    #[test]
    fn test_manifest_empty() {
        assert_eq!(Manifest::default().to_json().unwrap(), "{}");
        assert!(Manifest::parse("{}").unwrap().is_empty());
    }

    #[test]
    fn test_manifest_rejects_malformed() {
        assert!(Manifest::parse("not json").is_err());
        assert!(Manifest::parse(r#"{"a":"one"}"#).is_err());
        assert!(Manifest::parse("[1,2]").is_err());
    }

    #[test]
    fn test_oldest_first_sorts_by_marker() {
        let order = manifest(&[("c", 30), ("a", 10), ("b", 20)]).oldest_first();
        let keys: Vec<&str> = order.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_oldest_first_ties_put_lru_first() {
        // Same timestamp: document order is MRU first, so y is older than x
        let order = manifest(&[("x", 5), ("y", 5)]).oldest_first();
        let keys: Vec<&str> = order.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["y", "x"]);
    }
}
