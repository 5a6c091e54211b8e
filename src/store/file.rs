//! File-backed storage engine.
//!
//! The whole table lives in memory and is rewritten to a single JSON file
//! after every successful commit. Writes use the write-to-temp-then-rename
//! pattern for crash safety:
//!
//! 1. Write to `<path>.tmp`
//! 2. fsync the temp file
//! 3. Rename to `<path>`
//! 4. fsync the parent directory
//!
//! Readers of the file therefore see either the previous or the new table,
//! never a partial write. A commit is only made visible in memory once its
//! table has been persisted; a failed write leaves the store unchanged.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::memory::{Entry, Table};
use super::{AtomicOperation, CommitOutcome, Key, KvStore, Result, StoreError, VersionedValue};
use crate::clock::{Clock, SystemClock};

/// Current on-disk schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    key: Key,
    #[serde(flatten)]
    entry: Entry,
}

/// The JSON document stored at the store path.
///
/// Entries are a list rather than a map because tuple keys are not valid
/// JSON object keys.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTable {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    last_versionstamp: u64,
    entries: Vec<PersistedEntry>,
}

impl PersistedTable {
    fn from_table(table: &Table, now: DateTime<Utc>) -> Self {
        PersistedTable {
            schema_version: SCHEMA_VERSION,
            saved_at: now,
            last_versionstamp: table.last_versionstamp,
            entries: table
                .entries
                .iter()
                .map(|(key, entry)| PersistedEntry {
                    key: key.clone(),
                    entry: entry.clone(),
                })
                .collect(),
        }
    }

    fn into_table(self) -> Table {
        Table {
            entries: self
                .entries
                .into_iter()
                .map(|e| (e.key, e.entry))
                .collect(),
            last_versionstamp: self.last_versionstamp,
        }
    }
}

/// A store persisted to a single JSON file.
pub struct FileStore {
    path: PathBuf,
    table: Mutex<Table>,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    /// Opens the store at `path`, creating an empty one if the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.into();
        let table = match load_table(&path) {
            Ok(table) => {
                info!(
                    path = %path.display(),
                    entries = table.entries.len(),
                    "Loaded store"
                );
                table
            }
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No existing store, starting empty");
                Table::default()
            }
            Err(e) => return Err(e),
        };

        Ok(FileStore {
            path,
            table: Mutex::new(table),
            clock,
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &Key) -> Result<Option<VersionedValue>> {
        let table = self.table.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(table.get(key, self.clock.now()))
    }

    fn list(&self, prefix: &Key) -> Result<Vec<(Key, VersionedValue)>> {
        let table = self.table.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(table.list(prefix, self.clock.now()))
    }

    fn commit(&self, op: AtomicOperation) -> Result<CommitOutcome> {
        let mut table = self.table.lock().map_err(|_| StoreError::Poisoned)?;
        let now = self.clock.now();

        let mut next = table.clone();
        let outcome = next.commit(op, now);
        if let CommitOutcome::Committed(versionstamp) = outcome {
            save_table_atomic(&self.path, &PersistedTable::from_table(&next, now))?;
            debug!(versionstamp, "Persisted store");
            *table = next;
        }

        Ok(outcome)
    }
}

fn load_table(path: &Path) -> Result<Table> {
    let bytes = std::fs::read(path)?;
    let persisted: PersistedTable = serde_json::from_slice(&bytes)?;

    if persisted.schema_version != SCHEMA_VERSION {
        return Err(StoreError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: persisted.schema_version,
        });
    }

    Ok(persisted.into_table())
}

fn save_table_atomic(path: &Path, table: &PersistedTable) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec(table)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Syncs a directory so a rename inside it survives power loss.
fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}
