//! Migrant Core - schema catalog and store migration engine.
//!
//! This crate describes versioned store schemas and migrates a persisted
//! store between them. Persistence is reached through the traits in
//! [`migration::backend`].

pub mod catalog;
pub mod error;
pub mod migration;

pub use catalog::{DefaultValue, EntityDef, FieldDef, FieldType, ScalarType, SchemaBundle, StoreMetadata};
pub use error::{BoxError, Error};
pub use migration::{
    EntityMapping, Mapping, MappingSource, MetadataReader, MigrationError, MigrationPlan,
    MigrationProgress, MigrationReport, MigrationState, MigrationStatus, Migrator, MigratorConfig,
    Record, StoreHandle, StoreLifecycleManager, StoreTransformBackend, VersionGraph, VersionId,
};
