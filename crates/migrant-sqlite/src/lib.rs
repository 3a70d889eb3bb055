//! Migrant SQLite - SQLite store backend for the migration engine.
//!
//! Provides a record store on a single SQLite file, a metadata reader, a
//! transform backend that interprets mapping descriptors, and the
//! write-ahead log checkpoint run before a migration.

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod metadata;
pub mod store;

pub use backend::SqliteTransformBackend;
pub use checkpoint::checkpoint_wal;
pub use config::{JournalMode, StoreConfig, Synchronous};
pub use error::{Result, SqliteStoreError};
pub use metadata::SqliteMetadataReader;
pub use store::SqliteStore;
