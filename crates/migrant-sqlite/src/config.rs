//! Connection configuration.

use rusqlite::Connection;
use std::fmt;
use std::time::Duration;

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Rollback journal, deleted at the end of each transaction.
    Delete,
    /// Rollback journal, truncated instead of deleted.
    Truncate,
    /// Write-ahead log.
    Wal,
}

impl JournalMode {
    /// The pragma value.
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalMode::Delete => "delete",
            JournalMode::Truncate => "truncate",
            JournalMode::Wal => "wal",
        }
    }
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQLite synchronous level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synchronous {
    /// Never sync.
    Off,
    /// Sync at critical moments.
    Normal,
    /// Sync on every commit.
    Full,
}

impl Synchronous {
    /// The pragma value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Synchronous::Off => "OFF",
            Synchronous::Normal => "NORMAL",
            Synchronous::Full => "FULL",
        }
    }
}

/// Store connection configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Journal mode applied when a store is opened for writing.
    pub journal_mode: JournalMode,

    /// How long to wait on a locked database.
    pub busy_timeout: Duration,

    /// Durability level.
    pub synchronous: Synchronous,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            journal_mode: JournalMode::Wal,
            busy_timeout: Duration::from_secs(5),
            synchronous: Synchronous::Full,
        }
    }
}

impl StoreConfig {
    /// Set the journal mode.
    pub fn with_journal_mode(mut self, journal_mode: JournalMode) -> Self {
        self.journal_mode = journal_mode;
        self
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Set the synchronous level.
    pub fn with_synchronous(mut self, synchronous: Synchronous) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// Apply the configuration to a writable connection.
    ///
    /// Returns the journal mode SQLite reports after the change.
    pub(crate) fn apply(&self, conn: &Connection) -> rusqlite::Result<String> {
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "synchronous", self.synchronous.as_str())?;
        set_journal_mode(conn, self.journal_mode)
    }
}

/// Switch the journal mode and return the mode now in effect.
pub(crate) fn set_journal_mode(conn: &Connection, mode: JournalMode) -> rusqlite::Result<String> {
    conn.pragma_update_and_check(None, "journal_mode", mode.as_str(), |row| row.get::<_, String>(0))
        .map(|mode| mode.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::default()
            .with_journal_mode(JournalMode::Delete)
            .with_busy_timeout(Duration::from_millis(250))
            .with_synchronous(Synchronous::Normal);

        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.synchronous, Synchronous::Normal);
    }

    #[test]
    fn test_apply_sets_journal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("config.store")).unwrap();

        let mode = StoreConfig::default().apply(&conn).unwrap();
        assert_eq!(mode, "wal");

        let mode = StoreConfig::default()
            .with_journal_mode(JournalMode::Truncate)
            .apply(&conn)
            .unwrap();
        assert_eq!(mode, "truncate");
    }
}
