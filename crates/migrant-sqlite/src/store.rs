//! SQLite-backed record store.
//!
//! Records are kept as JSON bodies keyed by `(entity, id)`. The schema
//! metadata the migration engine resolves versions from lives in a
//! separate key/value table.

use crate::config::StoreConfig;
use crate::error::{Result, SqliteStoreError};
use migrant_core::{Record, StoreMetadata};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        entity TEXT NOT NULL,
        id TEXT NOT NULL,
        body TEXT NOT NULL,
        PRIMARY KEY (entity, id)
    );

    CREATE TABLE IF NOT EXISTS store_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

const METADATA_KEY: &str = "schema";

/// A store file.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// Open or create the store at `path` for reading and writing.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        config.apply(&conn)?;
        conn.execute_batch(SCHEMA)?;

        debug!(path = %path.display(), "opened store");
        Ok(Self { conn, path })
    }

    /// Open an existing store without write access.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn, path })
    }

    /// Location of the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or overwrite a record.
    pub fn insert(&self, record: &Record) -> Result<()> {
        insert_record(&self.conn, record)
    }

    /// Write records and, optionally, metadata in one transaction.
    ///
    /// Returns the number of records written.
    pub fn write_batch(&mut self, records: &[Record], metadata: Option<&StoreMetadata>) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for record in records {
            insert_record(&tx, record)?;
        }
        if let Some(metadata) = metadata {
            upsert_metadata(&tx, metadata)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// All records of `entity`, ordered by identifier.
    pub fn records(&self, entity: &str) -> Result<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, body FROM records WHERE entity = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![entity], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, body) = row?;
            records.push(decode(entity, id, &body)?);
        }
        Ok(records)
    }

    /// Look up a single record.
    pub fn get(&self, entity: &str, id: &str) -> Result<Option<Record>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM records WHERE entity = ?1 AND id = ?2",
                params![entity, id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|body| decode(entity, id.to_string(), &body)).transpose()
    }

    /// Number of records of `entity`.
    pub fn count(&self, entity: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE entity = ?1",
            params![entity],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Stamp the store with schema metadata.
    pub fn write_metadata(&self, metadata: &StoreMetadata) -> Result<()> {
        upsert_metadata(&self.conn, metadata)
    }

    /// Read the schema metadata of the store.
    pub fn read_metadata(&self) -> Result<StoreMetadata> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM store_metadata WHERE key = ?1",
                params![METADATA_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(StoreMetadata::from_json(&json)?),
            None => Err(SqliteStoreError::MissingMetadata {
                path: self.path.clone(),
            }),
        }
    }

    /// Close the connection, reporting any error SQLite raises on close.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| SqliteStoreError::Sqlite(e))
    }
}

fn insert_record(conn: &Connection, record: &Record) -> Result<()> {
    let body = serde_json::Value::Object(record.values.clone()).to_string();
    conn.execute(
        "INSERT OR REPLACE INTO records (entity, id, body) VALUES (?1, ?2, ?3)",
        params![record.entity, record.id, body],
    )?;
    Ok(())
}

fn upsert_metadata(conn: &Connection, metadata: &StoreMetadata) -> Result<()> {
    let json = metadata.to_json()?;
    conn.execute(
        "INSERT OR REPLACE INTO store_metadata (key, value) VALUES (?1, ?2)",
        params![METADATA_KEY, json],
    )?;
    Ok(())
}

fn decode(entity: &str, id: String, body: &str) -> Result<Record> {
    let values = serde_json::from_str(body).map_err(|source| SqliteStoreError::InvalidBody {
        entity: entity.to_string(),
        id: id.clone(),
        source,
    })?;
    Ok(Record {
        entity: entity.to_string(),
        id,
        values,
    })
}
