//! Write-ahead log checkpointing.

use crate::config::{set_journal_mode, JournalMode};
use crate::error::{Result, SqliteStoreError};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, instrument};

/// Merge the write-ahead log of the store at `path` into its main file.
///
/// Switches the store to the `delete` journal mode, which folds the log
/// into the main file and removes the `-wal` and `-shm` companions. No
/// other connection may be open on the store; SQLite would otherwise keep
/// the log and the call fails.
#[instrument]
pub fn checkpoint_wal(path: &Path) -> Result<()> {
    let conn = Connection::open(path)?;
    let mode = set_journal_mode(&conn, JournalMode::Delete)?;
    conn.close().map_err(|(_, e)| SqliteStoreError::Sqlite(e))?;

    if mode != JournalMode::Delete.as_str() {
        return Err(SqliteStoreError::JournalMode {
            path: path.to_path_buf(),
            expected: JournalMode::Delete.as_str(),
            actual: mode,
        });
    }

    debug!("checkpointed write-ahead log");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SqliteStore, StoreConfig};
    use migrant_core::migration::sidecar_path;
    use migrant_core::Record;

    #[test]
    fn test_checkpoint_leaves_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.store");

        let store = SqliteStore::open(&path, &StoreConfig::default()).unwrap();
        store.insert(&Record::with_id("Book", "b1").with_value("title", "Dune")).unwrap();
        store.close().unwrap();

        checkpoint_wal(&path).unwrap();

        assert!(!sidecar_path(&path, "-wal").exists());
        assert!(!sidecar_path(&path, "-shm").exists());

        let conn = Connection::open(&path).unwrap();
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap();
        assert_eq!(mode, "delete");

        let store = SqliteStore::open_read_only(&path).unwrap();
        assert_eq!(store.count("Book").unwrap(), 1);
    }

    #[test]
    fn test_checkpoint_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(checkpoint_wal(&dir.path().join("nope").join("books.store")).is_err());
    }
}
