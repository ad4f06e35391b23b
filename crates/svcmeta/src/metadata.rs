//! # Call Metadata
//!
//! An ordered list of key/value pairs. Keys may repeat; lookups return the
//! first match in insertion order.
//!
//! ## Lookup
//!
//! - Case-insensitive by default (`get`, `get_value`), matching how header
//!   names are compared on the wire.
//! - Exact matching is available through `get_with` / `get_value_with`.
//! - Case folding is ASCII-only. Keys differing in non-ASCII letters only
//!   never match each other.

use std::fmt;

/// A single metadata pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    fn matches(&self, key: &str, ignore_case: bool) -> bool {
        if ignore_case {
            self.key.eq_ignore_ascii_case(key)
        } else {
            self.key == key
        }
    }
}

/// Ordered collection of metadata entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<MetadataEntry>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Existing entries with the same key are kept.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.push(MetadataEntry::new(key, value));
        self
    }

    /// Fluent variant of [`Metadata::add`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    /// Appends every entry of `other`, preserving its order.
    pub fn extend(&mut self, other: &Metadata) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Returns the first entry whose key matches, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&MetadataEntry> {
        self.get_with(key, true)
    }

    /// Returns the first entry whose key matches.
    pub fn get_with(&self, key: &str, ignore_case: bool) -> Option<&MetadataEntry> {
        self.entries.iter().find(|e| e.matches(key, ignore_case))
    }

    /// Returns the value of the first matching entry, ignoring ASCII case.
    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.get_value_with(key, true)
    }

    pub fn get_value_with(&self, key: &str, ignore_case: bool) -> Option<&str> {
        self.get_with(key, ignore_case).map(|e| e.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetadataEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", entry.key, entry.value)?;
        }
        write!(f, "}}")
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| MetadataEntry::new(k, v))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = &'a MetadataEntry;
    type IntoIter = std::slice::Iter<'a, MetadataEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
