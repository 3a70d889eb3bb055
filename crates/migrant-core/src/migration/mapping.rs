//! Mapping descriptors.
//!
//! A [`Mapping`] describes how records of one schema version become records
//! of the next. The planner and executor only sequence mappings; backends
//! interpret their contents.

use super::version::SchemaVersion;
use crate::catalog::DefaultValue;
use crate::error::BoxError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity the record belongs to.
    pub entity: String,
    /// Record identifier, unique within the store.
    pub id: String,
    /// Field values keyed by field name.
    pub values: Map<String, Value>,
}

impl Record {
    /// Create an empty record with a fresh identifier.
    pub fn new(entity: impl Into<String>) -> Self {
        Self::with_id(entity, uuid::Uuid::new_v4().to_string())
    }

    /// Create an empty record with the given identifier.
    pub fn with_id(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            values: Map::new(),
        }
    }

    /// Set a field value.
    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Set a field value in place.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }
}

/// Where a destination attribute takes its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    /// Destination field name.
    pub destination: String,
    /// Source field to copy, if any.
    pub source: Option<String>,
    /// Value used when the source is absent or missing from the record.
    pub default: Option<DefaultValue>,
}

impl AttributeMapping {
    /// Copy `source` into `destination`.
    pub fn copy(destination: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            source: Some(source.into()),
            default: None,
        }
    }

    /// Fill `destination` with a constant.
    pub fn constant(destination: impl Into<String>, value: DefaultValue) -> Self {
        Self {
            destination: destination.into(),
            source: None,
            default: Some(value),
        }
    }

    /// Set the fallback value.
    pub fn or_default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// Collects the records an entity mapping emits for one source record.
#[derive(Debug, Default)]
pub struct RecordSink {
    records: Vec<Record>,
}

impl RecordSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a destination record.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Number of records emitted so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take the emitted records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Record-level custom migration logic for one entity mapping.
pub trait EntityPolicy: Send + Sync + fmt::Debug {
    /// Emit the destination records for `source`.
    ///
    /// [`EntityMapping::apply_attributes`] produces the default translation
    /// and may be used as a starting point.
    fn create_destination_records(
        &self,
        source: &Record,
        mapping: &EntityMapping,
        sink: &mut RecordSink,
    ) -> Result<(), BoxError>;
}

/// Mapping of one source entity into one destination entity.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    /// Source entity, `None` for entities new in the destination.
    pub source_entity: Option<String>,
    /// Destination entity.
    pub destination_entity: String,
    /// Attribute translations.
    pub attributes: Vec<AttributeMapping>,
    /// Custom record-level policy.
    pub policy: Option<Arc<dyn EntityPolicy>>,
}

impl EntityMapping {
    /// Map `source` records into `destination`.
    pub fn transform(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source_entity: Some(source.into()),
            destination_entity: destination.into(),
            attributes: Vec::new(),
            policy: None,
        }
    }

    /// Declare an entity that has no source counterpart.
    pub fn added(destination: impl Into<String>) -> Self {
        Self {
            source_entity: None,
            destination_entity: destination.into(),
            attributes: Vec::new(),
            policy: None,
        }
    }

    /// Add an attribute translation.
    pub fn with_attribute(mut self, attribute: AttributeMapping) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Attach a custom policy.
    pub fn with_policy(mut self, policy: Arc<dyn EntityPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Translate `source` using the attribute mappings.
    ///
    /// The destination record keeps the source identifier.
    pub fn apply_attributes(&self, source: &Record) -> Record {
        let mut record = Record::with_id(&self.destination_entity, &source.id);
        for attribute in &self.attributes {
            let value = attribute
                .source
                .as_deref()
                .and_then(|field| source.get(field))
                .filter(|v| !v.is_null())
                .cloned()
                .or_else(|| attribute.default.as_ref().map(DefaultValue::to_json));
            if let Some(value) = value {
                record.set(&attribute.destination, value);
            }
        }
        record
    }

    /// Run the policy, or the attribute translation when there is none.
    pub fn migrate_record(&self, source: &Record, sink: &mut RecordSink) -> Result<(), BoxError> {
        match &self.policy {
            Some(policy) => policy.create_destination_records(source, self, sink),
            None => {
                sink.push(self.apply_attributes(source));
                Ok(())
            }
        }
    }
}

/// How a mapping was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingOrigin {
    /// Declared alongside the version.
    Explicit,
    /// Computed from the structural difference of two schemas.
    Inferred,
    /// Produced by a custom mapping provider.
    Custom,
}

/// One transformation pass from a source store into a destination store.
#[derive(Debug, Clone)]
pub struct Mapping {
    /// Human-readable name, used in logs and progress labels.
    pub name: String,
    /// How the mapping was obtained.
    pub origin: MappingOrigin,
    /// Entity translations, applied in order.
    pub entities: Vec<EntityMapping>,
}

impl Mapping {
    /// Create an explicit mapping.
    pub fn explicit(name: impl Into<String>) -> Self {
        Self::with_origin(name, MappingOrigin::Explicit)
    }

    /// Create an inferred mapping.
    pub fn inferred(name: impl Into<String>) -> Self {
        Self::with_origin(name, MappingOrigin::Inferred)
    }

    /// Create a mapping with the given origin.
    pub fn with_origin(name: impl Into<String>, origin: MappingOrigin) -> Self {
        Self {
            name: name.into(),
            origin,
            entities: Vec::new(),
        }
    }

    /// Add an entity translation.
    pub fn with_entity(mut self, entity: EntityMapping) -> Self {
        self.entities.push(entity);
        self
    }

    /// Check if this mapping was inferred.
    pub fn is_inferred(&self) -> bool {
        self.origin == MappingOrigin::Inferred
    }
}

/// Produces mappings for a hop at plan time.
pub trait MappingProvider: Send + Sync + fmt::Debug {
    /// Mappings from `from` to `to`, or `None` if the provider cannot map
    /// this hop.
    fn mappings(&self, from: &SchemaVersion, to: &SchemaVersion) -> Option<Vec<Mapping>>;
}

/// How the hop from a version to its successor is mapped.
#[derive(Debug, Clone, Default)]
pub enum MappingSource {
    /// Infer the mapping from the structural difference.
    #[default]
    Inferred,
    /// Use the given mappings, in order.
    Explicit(Vec<Mapping>),
    /// Ask a provider.
    Custom(Arc<dyn MappingProvider>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Duplicate;

    impl EntityPolicy for Duplicate {
        fn create_destination_records(
            &self,
            source: &Record,
            mapping: &EntityMapping,
            sink: &mut RecordSink,
        ) -> Result<(), BoxError> {
            sink.push(mapping.apply_attributes(source));
            sink.push(Record::new(&mapping.destination_entity).with_value("copy_of", source.id.clone()));
            Ok(())
        }
    }

    fn book() -> Record {
        Record::with_id("Book", "b1")
            .with_value("title", "Dune")
            .with_value("cover", Value::Null)
    }

    #[test]
    fn test_apply_attributes() {
        let mapping = EntityMapping::transform("Book", "Book")
            .with_attribute(AttributeMapping::copy("name", "title"))
            .with_attribute(AttributeMapping::constant("price", DefaultValue::Float(9.5)))
            .with_attribute(AttributeMapping::copy("cover", "cover").or_default(DefaultValue::String("none".into())))
            .with_attribute(AttributeMapping::copy("missing", "nope"));

        let record = mapping.apply_attributes(&book());
        assert_eq!(record.id, "b1");
        assert_eq!(record.get("name"), Some(&json!("Dune")));
        assert_eq!(record.get("price"), Some(&json!(9.5)));
        assert_eq!(record.get("cover"), Some(&json!("none")));
        assert!(record.get("missing").is_none());
        assert!(record.get("title").is_none());
    }

    #[test]
    fn test_policy_replaces_default_translation() {
        let mapping = EntityMapping::transform("Book", "Book")
            .with_attribute(AttributeMapping::copy("title", "title"))
            .with_policy(Arc::new(Duplicate));

        let mut sink = RecordSink::new();
        mapping.migrate_record(&book(), &mut sink).unwrap();
        let records = sink.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("copy_of"), Some(&json!("b1")));
    }

    #[test]
    fn test_mapping_builders() {
        let mapping = Mapping::inferred("V1->V2").with_entity(EntityMapping::added("Cover"));
        assert!(mapping.is_inferred());
        assert_eq!(mapping.entities.len(), 1);
        assert!(!Mapping::explicit("x").is_inferred());
        assert!(matches!(MappingSource::default(), MappingSource::Inferred));
    }
}
