//! Core data models for the county statistics service

use crate::error::{Result, StatsError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Section holding the per-region summary aggregation
pub const SECTION_TOTAL: &str = "total";

/// Section holding the per-GAP-status breakdown aggregation
pub const SECTION_GAP_STATUS: &str = "gap_status";

/// Opaque, case-sensitive identifier of one cacheable region (e.g. a county
/// abbreviation)
///
/// Keys are never normalized or sanitized; they are passed through to the
/// backing store and the cache exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionKey(String);

impl RegionKey {
    pub fn new(key: impl Into<String>) -> Self {
        RegionKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionKey {
    fn from(key: &str) -> Self {
        RegionKey::new(key)
    }
}

impl From<String> for RegionKey {
    fn from(key: String) -> Self {
        RegionKey(key)
    }
}

/// Merged result of all sub-fetches for one region
///
/// Serializes as a flat JSON object keyed by section name. A record missing
/// one or more expected sections is *degraded*; use [`RegionRecord::is_complete`]
/// or [`RegionRecord::missing_sections`] to tell it apart from a complete one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionRecord {
    sections: Map<String, Value>,
}

impl RegionRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a section, returning the previous value if any
    pub fn insert_section(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.sections.insert(name.into(), value)
    }

    /// Key-wise union: sections from `other` overwrite sections of the same name
    pub fn merge(&mut self, other: RegionRecord) {
        for (name, value) in other.sections {
            self.sections.insert(name, value);
        }
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Names from `expected` that this record does not carry
    pub fn missing_sections<'a>(&self, expected: &[&'a str]) -> Vec<&'a str> {
        expected
            .iter()
            .copied()
            .filter(|name| !self.sections.contains_key(*name))
            .collect()
    }

    /// Whether every name in `expected` is present
    pub fn is_complete(&self, expected: &[&str]) -> bool {
        self.missing_sections(expected).is_empty()
    }

    /// Encode as the self-describing cache value format (JSON text)
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the cache value format
    ///
    /// Anything other than a JSON object is rejected.
    pub fn from_json(value: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(value)? {
            Value::Object(sections) => Ok(RegionRecord { sections }),
            other => Err(StatsError::SerializationError(format!(
                "cached region record must be a JSON object, got: {}",
                other
            ))),
        }
    }
}

impl From<Map<String, Value>> for RegionRecord {
    fn from(sections: Map<String, Value>) -> Self {
        RegionRecord { sections }
    }
}

/// Outcome of one warm cycle
///
/// Completion means a store was attempted for every key of the catalog, not
/// that every key succeeded: `stored + failures.len() == total_keys`.
#[derive(Debug, Clone, Default)]
pub struct WarmReport {
    /// Number of keys in the catalog snapshot
    pub total_keys: usize,
    /// Keys whose record was fetched and written to the cache
    pub stored: usize,
    /// Stored keys whose record was missing at least one expected section
    pub degraded: usize,
    /// Per-key failures, one entry per key that was not stored
    pub failures: Vec<StatsError>,
    /// Wall-clock time of the whole cycle
    pub duration: Duration,
}

impl WarmReport {
    /// Number of keys for which a store was attempted
    pub fn attempted(&self) -> usize {
        self.stored + self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && self.stored == self.total_keys
    }
}
