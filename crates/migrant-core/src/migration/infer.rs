//! Structural mapping inference.
//!
//! Pairs entities and fields of two schemas by name or renaming identifier
//! and produces a mapping when every change is simple enough to carry out
//! without custom logic.

use super::mapping::{AttributeMapping, EntityMapping, Mapping};
use crate::catalog::{EntityDef, FieldDef, SchemaBundle};
use tracing::debug;

/// Computes a mapping from the structural difference of two schemas.
pub trait MappingInference: Send + Sync {
    /// Infer a mapping from `from` to `to`, or `None` if the difference
    /// cannot be bridged without an explicit mapping.
    fn infer(&self, from: &SchemaBundle, to: &SchemaBundle) -> Option<Mapping>;
}

/// Default inference.
///
/// Supported changes: adding, removing and renaming entities and fields,
/// making fields optional, numeric widening. An added field must be optional
/// or carry a default.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralInference;

impl MappingInference for StructuralInference {
    fn infer(&self, from: &SchemaBundle, to: &SchemaBundle) -> Option<Mapping> {
        let mut mapping = Mapping::inferred("inferred");

        for destination in to.entities.values() {
            match from.previous_entity(destination) {
                Some(source) => {
                    mapping = mapping.with_entity(Self::map_entity(source, destination)?);
                }
                None => {
                    mapping = mapping.with_entity(EntityMapping::added(&destination.name));
                }
            }
        }

        Some(mapping)
    }
}

impl StructuralInference {
    fn map_entity(source: &EntityDef, destination: &EntityDef) -> Option<EntityMapping> {
        let mut mapping = EntityMapping::transform(&source.name, &destination.name);

        for field in &destination.fields {
            mapping = mapping.with_attribute(Self::map_field(source, destination, field)?);
        }

        Some(mapping)
    }

    fn map_field(
        source: &EntityDef,
        destination: &EntityDef,
        field: &FieldDef,
    ) -> Option<AttributeMapping> {
        match source.previous_field(field) {
            Some(previous) => {
                if !previous.field_type.converts_losslessly_to(&field.field_type) {
                    debug!(
                        entity = %destination.name,
                        field = %field.name,
                        from = ?previous.field_type,
                        to = ?field.field_type,
                        "type change cannot be inferred"
                    );
                    return None;
                }
                if !previous.may_be_absent() || field.may_be_absent() {
                    let attribute = AttributeMapping::copy(&field.name, &previous.name);
                    Some(match &field.default {
                        Some(default) => attribute.or_default(default.clone()),
                        None => attribute,
                    })
                } else {
                    // optional -> required needs a default to fill the gaps
                    debug!(
                        entity = %destination.name,
                        field = %field.name,
                        "field became required without a default"
                    );
                    None
                }
            }
            None if field.may_be_absent() => Some(match &field.default {
                Some(default) => AttributeMapping::constant(&field.name, default.clone()),
                None => AttributeMapping {
                    destination: field.name.clone(),
                    source: None,
                    default: None,
                },
            }),
            None => {
                debug!(
                    entity = %destination.name,
                    field = %field.name,
                    "added required field has no default"
                );
                None
            }
        }
    }
}
