//! SQLite store error types.

use migrant_core::BoxError;
use std::path::PathBuf;
use thiserror::Error;

/// SQLite store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A record body is not a JSON object.
    #[error("invalid body for record {entity}/{id}: {source}")]
    InvalidBody {
        /// Entity of the record.
        entity: String,
        /// Identifier of the record.
        id: String,
        /// Underlying cause.
        #[source]
        source: serde_json::Error,
    },

    /// The store has never been stamped with schema metadata.
    #[error("store {} carries no schema metadata", .path.display())]
    MissingMetadata {
        /// The store that was read.
        path: PathBuf,
    },

    /// Stored metadata could not be decoded.
    #[error("metadata error: {0}")]
    Metadata(#[from] migrant_core::Error),

    /// SQLite refused a journal mode change.
    #[error("journal mode of {} is {actual}, expected {expected}", .path.display())]
    JournalMode {
        /// The store.
        path: PathBuf,
        /// Mode that was requested.
        expected: &'static str,
        /// Mode that is in effect.
        actual: String,
    },

    /// An entity policy rejected a record.
    #[error("policy for {entity} failed on record {id}: {source}")]
    Policy {
        /// Destination entity of the mapping.
        entity: String,
        /// Identifier of the source record.
        id: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
}

/// Result type for SQLite store operations.
pub type Result<T> = std::result::Result<T, SqliteStoreError>;
