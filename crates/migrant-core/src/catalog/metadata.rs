//! On-disk store metadata.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version metadata persisted alongside a store.
///
/// Compatibility with a schema is decided by `version_hashes` alone; the
/// identifier only records which version wrote the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Version hash of every entity, keyed by entity name.
    pub version_hashes: BTreeMap<String, String>,
    /// Identifier of the version that wrote the store, if known.
    pub version_identifier: Option<String>,
}

impl StoreMetadata {
    /// Serialize the metadata to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize metadata from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
