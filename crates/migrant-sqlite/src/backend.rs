//! Transform backend for SQLite stores.

use crate::checkpoint::checkpoint_wal;
use crate::config::StoreConfig;
use crate::error::SqliteStoreError;
use crate::store::SqliteStore;
use migrant_core::migration::{RecordSink, TransformRequest};
use migrant_core::{BoxError, StoreTransformBackend};
use std::path::Path;
use tracing::{debug, instrument};

/// Runs mappings between SQLite stores.
///
/// Each mapping reads the source through a read-only connection and writes
/// its whole output, together with the destination schema metadata, in a
/// single transaction. Both connections are closed before returning.
#[derive(Debug, Clone, Default)]
pub struct SqliteTransformBackend {
    config: StoreConfig,
}

impl SqliteTransformBackend {
    /// Create a backend that opens destinations with `config`.
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Configuration used for destination stores.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[instrument(skip(self, request), fields(mapping = %request.mapping.name, to = %request.destination_version))]
    fn run(&self, request: &TransformRequest<'_>) -> Result<usize, SqliteStoreError> {
        let source = SqliteStore::open_read_only(request.source)?;
        let mut sink = RecordSink::new();

        // one unit per source entity, one for the final write
        let total = request
            .mapping
            .entities
            .iter()
            .filter(|entity| entity.source_entity.is_some())
            .count() as u64
            + 1;
        let mut done = 0;

        for entity in &request.mapping.entities {
            let Some(source_entity) = entity.source_entity.as_deref() else {
                continue;
            };
            let records = source.records(source_entity)?;
            debug!(from = source_entity, to = %entity.destination_entity, records = records.len(), "mapping entity");

            for record in &records {
                entity
                    .migrate_record(record, &mut sink)
                    .map_err(|source| SqliteStoreError::Policy {
                        entity: entity.destination_entity.clone(),
                        id: record.id.clone(),
                        source,
                    })?;
            }
            done += 1;
            request.progress.report(done, total);
        }
        source.close()?;

        let metadata = request
            .destination_schema
            .metadata(Some(request.destination_version.as_str()));
        let mut destination = SqliteStore::open(request.destination, &self.config)?;
        let written = destination.write_batch(&sink.into_records(), Some(&metadata))?;
        destination.close()?;
        request.progress.report(total, total);

        debug!(written, "mapping applied");
        Ok(written)
    }
}

impl StoreTransformBackend for SqliteTransformBackend {
    fn transform(&self, request: &TransformRequest<'_>) -> Result<(), BoxError> {
        self.run(request)?;
        Ok(())
    }

    fn checkpoint(&self, location: &Path) -> Result<(), BoxError> {
        checkpoint_wal(location)?;
        Ok(())
    }
}
