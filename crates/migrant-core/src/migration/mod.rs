//! Migration engine.
//!
//! Moves a store from the schema version it holds to a target version
//! through a chain of incremental steps:
//! - Version resolution from on-disk metadata
//! - Planning, with mappings resolved once per hop
//! - Sequential step execution into scratch stores
//! - Weighted progress with cooperative cancellation
//! - A single atomic replace once every step has succeeded
//!
//! # Phases
//!
//! | Phase | Touches | On failure |
//! |-------|---------|------------|
//! | **Planning** | nothing | nothing to clean up |
//! | **Executing** | scratch stores only | scratch store of the failing step kept for inspection |
//! | **Finalizing** | destination | migrated store kept and returned in the error |
//!
//! # Example
//!
//! ```ignore
//! use migrant_core::migration::{Migrator, MigratorConfig, VersionGraph};
//!
//! let graph = Arc::new(
//!     VersionGraph::builder()
//!         .version("v1", schema_v1)
//!         .version_with("v2", schema_v2, MappingSource::Explicit(vec![mapping]))
//!         .version("v3", schema_v3)
//!         .build()?,
//! );
//!
//! let mut migrator = Migrator::in_place(graph, reader, backend, "books.store")
//!     .with_config(MigratorConfig::default().with_wal_checkpoint(true));
//!
//! // Cancel from another thread with `progress.cancel()`
//! let progress = migrator.progress();
//! let report = migrator.migrate(&"v3".into())?;
//! ```

pub mod backend;
pub mod error;
pub mod executor;
pub mod infer;
pub mod lifecycle;
pub mod mapping;
pub mod migrator;
pub mod plan;
pub mod progress;
pub mod state;
pub mod version;

pub use backend::{MetadataReader, ProgressSink, StoreTransformBackend, TransformRequest};
pub use error::MigrationError;
pub use executor::{StepEvent, StepExecutor, StepObserver};
pub use infer::{MappingInference, StructuralInference};
pub use lifecycle::{
    sidecar_path, LifecycleError, ReplaceError, StoreHandle, StoreKind, StoreLifecycleManager,
    SIDECAR_SUFFIXES,
};
pub use mapping::{
    AttributeMapping, EntityMapping, EntityPolicy, Mapping, MappingOrigin, MappingProvider,
    MappingSource, Record, RecordSink,
};
pub use migrator::{MigrationReport, Migrator, MigratorConfig};
pub use plan::{MigrationPlan, MigrationPlanner, MigrationStep};
pub use progress::{MigrationProgress, NodeSnapshot};
pub use state::{MigrationState, MigrationStatus, StepProgress, StepStatus};
pub use version::{SchemaProvider, SchemaVersion, VersionGraph, VersionGraphBuilder, VersionId};
