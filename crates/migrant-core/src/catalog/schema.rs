//! Schema bundle - snapshot of the entire schema at one version.

use super::{EntityDef, StoreMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A snapshot of the entire schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaBundle {
    /// Entity definitions keyed by name.
    pub entities: BTreeMap<String, EntityDef>,
}

impl SchemaBundle {
    /// Create an empty schema bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity to the schema.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Find the entity of this (previous) schema that `entity` descends from,
    /// pairing canonical names when the direct lookup fails.
    pub fn previous_entity(&self, entity: &EntityDef) -> Option<&EntityDef> {
        self.get_entity(entity.source_name())
            .or_else(|| {
                self.entities
                    .values()
                    .find(|e| e.source_name() == entity.source_name())
            })
            .or_else(|| self.get_entity(&entity.name))
    }

    /// List all entity names.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(|s| s.as_str()).collect()
    }

    /// Version hash of every entity, keyed by entity name.
    pub fn version_hashes(&self) -> BTreeMap<String, String> {
        self.entities
            .iter()
            .map(|(name, entity)| (name.clone(), entity.version_hash()))
            .collect()
    }

    /// Check whether a store carrying `metadata` can be opened with this
    /// schema without migrating it.
    pub fn is_compatible_with(&self, metadata: &StoreMetadata) -> bool {
        self.version_hashes() == metadata.version_hashes
    }

    /// Metadata a store written with this schema carries.
    pub fn metadata(&self, version_identifier: Option<&str>) -> StoreMetadata {
        StoreMetadata {
            version_hashes: self.version_hashes(),
            version_identifier: version_identifier.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, FieldType, ScalarType};

    fn sample_schema() -> SchemaBundle {
        let author = EntityDef::new("Author")
            .with_field(FieldDef::new("alias", FieldType::scalar(ScalarType::String)));
        let book = EntityDef::new("Book")
            .with_field(FieldDef::new("title", FieldType::scalar(ScalarType::String)))
            .with_field(FieldDef::new("author", FieldType::reference("Author")));

        SchemaBundle::new().with_entity(author).with_entity(book)
    }

    #[test]
    fn test_schema_bundle_builder() {
        let schema = sample_schema();

        assert_eq!(schema.entities.len(), 2);
        assert!(schema.get_entity("Book").is_some());
        assert!(schema.get_entity("Cover").is_none());
        assert_eq!(schema.entity_names(), vec!["Author", "Book"]);
    }

    #[test]
    fn test_compatible_with_own_metadata() {
        let schema = sample_schema();
        let metadata = schema.metadata(Some("V1"));

        assert!(schema.is_compatible_with(&metadata));
        assert_eq!(metadata.version_identifier.as_deref(), Some("V1"));
    }

    #[test]
    fn test_identifier_does_not_affect_compatibility() {
        let schema = sample_schema();
        assert!(schema.is_compatible_with(&schema.metadata(Some("something-else"))));
        assert!(schema.is_compatible_with(&schema.metadata(None)));
    }

    #[test]
    fn test_incompatible_after_structural_change() {
        let schema = sample_schema();
        let metadata = schema.metadata(None);

        let changed = sample_schema().with_entity(
            EntityDef::new("Cover").with_field(FieldDef::new("data", FieldType::scalar(ScalarType::Bytes))),
        );
        assert!(!changed.is_compatible_with(&metadata));
    }
}
