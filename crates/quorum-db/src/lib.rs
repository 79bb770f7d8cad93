pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use tracing::info;

use quorum_voting::VotingError;

pub use queries::ballots::CastOutcome;
pub use queries::sessions::{CloseOutcome, SessionSnapshot};

const READER_POOL_SIZE: usize = 4;

/// SQLite store with one writer and a small pool of read-only connections.
///
/// Every state change (cast, close, edit, chat append) runs as an IMMEDIATE
/// transaction on the writer, so per-session invariants are checked and
/// applied without a read-then-write race.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(std::time::Duration::from_secs(5))?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Single-connection database for tests; reads go through the writer.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let writer = Connection::open_in_memory()?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&writer)?;
        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, VotingError>
    where
        F: FnOnce(&Connection) -> Result<T, VotingError>,
    {
        if self.readers.is_empty() {
            let conn = self
                .writer
                .lock()
                .map_err(|e| anyhow!("Writer lock poisoned: {}", e))?;
            return f(&conn);
        }
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| anyhow!("Reader lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Run `f` inside a deferred transaction on a reader, so every query in
    /// `f` sees the same committed state.
    pub fn with_read_tx<F, T>(&self, f: F) -> Result<T, VotingError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, VotingError>,
    {
        let slot = if self.readers.is_empty() {
            &self.writer
        } else {
            let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
            &self.readers[idx]
        };
        let mut conn = slot
            .lock()
            .map_err(|e| anyhow!("Connection lock poisoned: {}", e))?;
        let tx = conn.transaction().storage()?;
        let value = f(&tx)?;
        tx.commit().storage()?;
        Ok(value)
    }

    /// Run `f` inside an IMMEDIATE transaction on the writer. Returning an
    /// error from `f` rolls everything back.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, VotingError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, VotingError>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| anyhow!("Writer lock poisoned: {}", e))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .storage()?;
        let value = f(&tx)?;
        tx.commit().storage()?;
        Ok(value)
    }
}

/// Adapts rusqlite results to the domain error type.
pub(crate) trait SqlResultExt<T> {
    fn storage(self) -> Result<T, VotingError>;
    fn optional_row(self) -> Result<Option<T>, VotingError>;
}

impl<T> SqlResultExt<T> for rusqlite::Result<T> {
    fn storage(self) -> Result<T, VotingError> {
        self.map_err(|e| VotingError::Storage(e.into()))
    }

    fn optional_row(self) -> Result<Option<T>, VotingError> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(VotingError::Storage(e.into())),
        }
    }
}
