//! Entity definitions.

use super::field::FieldDef;
use serde::{Deserialize, Serialize};

/// An entity definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within schema).
    pub name: String,
    /// Field definitions.
    pub fields: Vec<FieldDef>,
    /// Name this entity had in the previous schema version, if it was renamed.
    pub renaming_id: Option<String>,
    /// Extra input mixed into the version hash.
    ///
    /// Changing it forces a new fingerprint for changes the structural hash
    /// does not see, such as a semantic change of a field's contents.
    pub version_hash_modifier: Option<String>,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            renaming_id: None,
            version_hash_modifier: None,
        }
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Record the name this entity had in the previous version.
    pub fn renamed_from(mut self, previous: impl Into<String>) -> Self {
        self.renaming_id = Some(previous.into());
        self
    }

    /// Set the version hash modifier.
    pub fn with_hash_modifier(mut self, modifier: impl Into<String>) -> Self {
        self.version_hash_modifier = Some(modifier.into());
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The name to look for in the previous version of the schema.
    pub fn source_name(&self) -> &str {
        self.renaming_id.as_deref().unwrap_or(&self.name)
    }

    /// Find the field of this (previous) entity that `field` descends from.
    ///
    /// A renaming identifier survives across versions, so after the direct
    /// name lookup the fields are paired by their canonical names.
    pub fn previous_field(&self, field: &FieldDef) -> Option<&FieldDef> {
        self.get_field(field.source_name())
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|f| f.source_name() == field.source_name())
            })
            .or_else(|| self.get_field(&field.name))
    }

    /// Compute the structural version hash of this entity.
    ///
    /// Covers the entity name, the hash modifier and every field's name,
    /// type and required flag. Field order does not matter.
    pub fn version_hash(&self) -> String {
        let mut fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{}:{}:{}", f.name, f.field_type.fingerprint(), f.required))
            .collect();
        fields.sort();

        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_bytes());
        hasher.update(&[0]);
        if let Some(modifier) = &self.version_hash_modifier {
            hasher.update(modifier.as_bytes());
        }
        for field in &fields {
            hasher.update(&[0]);
            hasher.update(field.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}
