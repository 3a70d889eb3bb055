//! Metadata reader for SQLite stores.

use crate::store::SqliteStore;
use migrant_core::{BoxError, MetadataReader, StoreMetadata};
use std::path::Path;

/// Reads schema metadata through a read-only connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteMetadataReader;

impl SqliteMetadataReader {
    /// Create a reader.
    pub fn new() -> Self {
        Self
    }
}

impl MetadataReader for SqliteMetadataReader {
    fn read_metadata(&self, location: &Path) -> Result<StoreMetadata, BoxError> {
        let store = SqliteStore::open_read_only(location)?;
        let metadata = store.read_metadata()?;
        store.close()?;
        Ok(metadata)
    }
}
