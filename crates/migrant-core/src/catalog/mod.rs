//! Schema catalog.
//!
//! Describes entities and fields of one schema version and derives the
//! structural fingerprints stores are matched against.

mod entity;
mod field;
mod metadata;
mod schema;
mod types;

pub use entity::EntityDef;
pub use field::{DefaultValue, FieldDef};
pub use metadata::StoreMetadata;
pub use schema::SchemaBundle;
pub use types::{FieldType, ScalarType};
