//! Schema version chain.
//!
//! Versions are stored in declaration order; each version's successor is
//! the next entry. Reachability is therefore an index comparison and the
//! chain cannot contain cycles.

use super::error::MigrationError;
use super::mapping::MappingSource;
use crate::catalog::{SchemaBundle, StoreMetadata};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a schema version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId(String);

impl VersionId {
    /// Create a new version identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VersionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One version of the schema and how to reach its successor.
#[derive(Debug)]
pub struct SchemaVersion {
    id: VersionId,
    schema: SchemaBundle,
    mapping_source: MappingSource,
    position: usize,
}

impl SchemaVersion {
    /// Version identifier.
    pub fn id(&self) -> &VersionId {
        &self.id
    }

    /// Schema of this version.
    pub fn schema(&self) -> &SchemaBundle {
        &self.schema
    }

    /// How stores at this version are migrated to the successor.
    pub fn mapping_source(&self) -> &MappingSource {
        &self.mapping_source
    }

    /// Position of this version in the chain.
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Provides the schema of a version.
pub trait SchemaProvider {
    /// Schema for `version`, if the version is known.
    fn schema(&self, version: &VersionId) -> Option<&SchemaBundle>;
}

/// Forward-only chain of schema versions.
#[derive(Debug)]
pub struct VersionGraph {
    versions: Vec<SchemaVersion>,
    positions: HashMap<VersionId, usize>,
}

impl VersionGraph {
    /// Start building a graph.
    pub fn builder() -> VersionGraphBuilder {
        VersionGraphBuilder::default()
    }

    /// Number of versions in the chain.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Check if the chain has no versions.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// All versions, oldest first.
    pub fn versions(&self) -> impl Iterator<Item = &SchemaVersion> {
        self.versions.iter()
    }

    /// Look up a version.
    pub fn get(&self, id: &VersionId) -> Option<&SchemaVersion> {
        self.positions.get(id).map(|&pos| &self.versions[pos])
    }

    /// Look up a version, failing if it is unknown.
    pub fn require(&self, id: &VersionId) -> Result<&SchemaVersion, MigrationError> {
        self.get(id)
            .ok_or_else(|| MigrationError::UnknownVersion(id.clone()))
    }

    /// The newest version.
    pub fn latest(&self) -> Option<&SchemaVersion> {
        self.versions.last()
    }

    /// Find the version whose schema matches `metadata`.
    ///
    /// Versions are tested in declaration order and the first match wins.
    pub fn resolve(&self, metadata: &StoreMetadata) -> Result<&SchemaVersion, MigrationError> {
        self.versions
            .iter()
            .find(|v| v.schema.is_compatible_with(metadata))
            .ok_or(MigrationError::VersionNotFound { location: None })
    }

    /// The version following `id`, if any.
    pub fn successor(&self, id: &VersionId) -> Option<&SchemaVersion> {
        let pos = *self.positions.get(id)?;
        self.versions.get(pos + 1)
    }

    /// Check whether walking successors from `from` reaches `to`.
    pub fn is_reachable(&self, from: &VersionId, to: &VersionId) -> bool {
        match (self.positions.get(from), self.positions.get(to)) {
            (Some(from), Some(to)) => from <= to,
            _ => false,
        }
    }

    /// Check if a store with `metadata` differs from the schema of `target`.
    pub fn is_migration_necessary(
        &self,
        metadata: &StoreMetadata,
        target: &VersionId,
    ) -> Result<bool, MigrationError> {
        Ok(!self.require(target)?.schema.is_compatible_with(metadata))
    }
}

impl SchemaProvider for VersionGraph {
    fn schema(&self, version: &VersionId) -> Option<&SchemaBundle> {
        self.get(version).map(SchemaVersion::schema)
    }
}

/// Builder for [`VersionGraph`].
#[derive(Debug, Default)]
pub struct VersionGraphBuilder {
    versions: Vec<(VersionId, SchemaBundle, MappingSource)>,
}

impl VersionGraphBuilder {
    /// Append a version whose hop to the successor is inferred.
    pub fn version(self, id: impl Into<VersionId>, schema: SchemaBundle) -> Self {
        self.version_with(id, schema, MappingSource::Inferred)
    }

    /// Append a version with an explicit mapping source for the hop to the
    /// successor.
    pub fn version_with(
        mut self,
        id: impl Into<VersionId>,
        schema: SchemaBundle,
        mapping_source: MappingSource,
    ) -> Self {
        self.versions.push((id.into(), schema, mapping_source));
        self
    }

    /// Build the graph.
    pub fn build(self) -> Result<VersionGraph, MigrationError> {
        if self.versions.is_empty() {
            return Err(MigrationError::InvalidGraph {
                reason: "graph has no versions".to_string(),
            });
        }

        let mut positions = HashMap::with_capacity(self.versions.len());
        let mut versions = Vec::with_capacity(self.versions.len());

        for (position, (id, schema, mapping_source)) in self.versions.into_iter().enumerate() {
            if positions.insert(id.clone(), position).is_some() {
                return Err(MigrationError::InvalidGraph {
                    reason: format!("duplicate version {id}"),
                });
            }
            versions.push(SchemaVersion {
                id,
                schema,
                mapping_source,
                position,
            });
        }

        Ok(VersionGraph {
            versions,
            positions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, FieldType, ScalarType};

    fn schema_with(fields: &[&str]) -> SchemaBundle {
        let mut book = EntityDef::new("Book");
        for field in fields {
            book = book.with_field(FieldDef::new(*field, FieldType::scalar(ScalarType::String)));
        }
        SchemaBundle::new().with_entity(book)
    }

    fn graph() -> VersionGraph {
        VersionGraph::builder()
            .version("V1", schema_with(&["title"]))
            .version("V2", schema_with(&["title", "isbn"]))
            .version("V3", schema_with(&["title", "isbn", "blurb"]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_successor_chain() {
        let graph = graph();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.successor(&"V1".into()).unwrap().id().as_str(), "V2");
        assert_eq!(graph.successor(&"V2".into()).unwrap().id().as_str(), "V3");
        assert!(graph.successor(&"V3".into()).is_none());
        assert!(graph.successor(&"V9".into()).is_none());
        assert_eq!(graph.latest().unwrap().id().as_str(), "V3");
    }

    #[test]
    fn test_reachability() {
        let graph = graph();
        assert!(graph.is_reachable(&"V1".into(), &"V3".into()));
        assert!(graph.is_reachable(&"V2".into(), &"V2".into()));
        assert!(!graph.is_reachable(&"V3".into(), &"V1".into()));
        assert!(!graph.is_reachable(&"V1".into(), &"V9".into()));
    }

    #[test]
    fn test_resolve_matches_metadata() {
        let graph = graph();
        let metadata = schema_with(&["title", "isbn"]).metadata(None);
        assert_eq!(graph.resolve(&metadata).unwrap().id().as_str(), "V2");

        let unknown = schema_with(&["subtitle"]).metadata(None);
        assert!(matches!(
            graph.resolve(&unknown),
            Err(MigrationError::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let graph = VersionGraph::builder()
            .version("A", schema_with(&["title"]))
            .version("B", schema_with(&["title"]))
            .build()
            .unwrap();
        let metadata = schema_with(&["title"]).metadata(None);
        assert_eq!(graph.resolve(&metadata).unwrap().id().as_str(), "A");
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let result = VersionGraph::builder()
            .version("V1", schema_with(&["title"]))
            .version("V1", schema_with(&["isbn"]))
            .build();
        assert!(matches!(result, Err(MigrationError::InvalidGraph { .. })));
        assert!(VersionGraph::builder().build().is_err());
    }

    #[test]
    fn test_independent_graphs_coexist() {
        let first = graph();
        let second = VersionGraph::builder()
            .version("V1", schema_with(&["name"]))
            .build()
            .unwrap();

        assert_eq!(first.schema(&"V1".into()).unwrap(), &schema_with(&["title"]));
        assert_eq!(second.schema(&"V1".into()).unwrap(), &schema_with(&["name"]));
    }

    #[test]
    fn test_is_migration_necessary() {
        let graph = graph();
        let at_v2 = schema_with(&["title", "isbn"]).metadata(Some("V2"));

        assert!(graph.is_migration_necessary(&at_v2, &"V3".into()).unwrap());
        assert!(!graph.is_migration_necessary(&at_v2, &"V2".into()).unwrap());
        assert!(graph.is_migration_necessary(&at_v2, &"V7".into()).is_err());
    }
}
