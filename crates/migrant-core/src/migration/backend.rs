//! Seams to the persistence layer.
//!
//! The engine never opens a store itself. Reading version metadata and
//! moving records between stores go through these traits.

use super::mapping::Mapping;
use super::version::VersionId;
use crate::catalog::{SchemaBundle, StoreMetadata};
use crate::error::BoxError;
use std::path::Path;

/// Receives progress from inside a running mapping.
pub trait ProgressSink {
    /// Report `completed` out of `total` units of the running mapping.
    ///
    /// Units are whatever the backend counts (records, entities, batches).
    /// Reports with a zero total are ignored.
    fn report(&self, completed: u64, total: u64);
}

impl<F: Fn(u64, u64)> ProgressSink for F {
    fn report(&self, completed: u64, total: u64) {
        self(completed, total)
    }
}

/// Everything a backend needs to run one mapping.
#[derive(Clone, Copy)]
pub struct TransformRequest<'a> {
    /// The mapping to run.
    pub mapping: &'a Mapping,
    /// Store to read. Never written.
    pub source: &'a Path,
    /// Temporary store to write into.
    pub destination: &'a Path,
    /// Schema of the source store.
    pub source_schema: &'a SchemaBundle,
    /// Schema the destination store must end up with.
    pub destination_schema: &'a SchemaBundle,
    /// Version of the source store.
    pub source_version: &'a VersionId,
    /// Version of the destination store.
    pub destination_version: &'a VersionId,
    /// Where to report progress within the mapping.
    pub progress: &'a dyn ProgressSink,
}

impl std::fmt::Debug for TransformRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRequest")
            .field("mapping", &self.mapping.name)
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("source_version", &self.source_version)
            .field("destination_version", &self.destination_version)
            .finish_non_exhaustive()
    }
}

/// Moves data from one store into another according to a mapping.
///
/// Calls are blocking and may be slow. Within a step, later mappings see
/// the destination as left by earlier ones.
pub trait StoreTransformBackend: Send + Sync {
    /// Run one mapping from `request.source` into `request.destination`.
    fn transform(&self, request: &TransformRequest<'_>) -> Result<(), BoxError>;

    /// Merge any write-ahead log of the store at `location` into its main
    /// artifact.
    ///
    /// The store must not be open elsewhere.
    fn checkpoint(&self, location: &Path) -> Result<(), BoxError> {
        let _ = location;
        Ok(())
    }
}

/// Reads the version metadata of a store without migrating it.
pub trait MetadataReader: Send + Sync {
    /// Read the metadata of the store at `location`.
    fn read_metadata(&self, location: &Path) -> Result<StoreMetadata, BoxError>;
}

impl<T: StoreTransformBackend + ?Sized> StoreTransformBackend for &T {
    fn transform(&self, request: &TransformRequest<'_>) -> Result<(), BoxError> {
        (**self).transform(request)
    }

    fn checkpoint(&self, location: &Path) -> Result<(), BoxError> {
        (**self).checkpoint(location)
    }
}

impl<T: MetadataReader + ?Sized> MetadataReader for &T {
    fn read_metadata(&self, location: &Path) -> Result<StoreMetadata, BoxError> {
        (**self).read_metadata(location)
    }
}
