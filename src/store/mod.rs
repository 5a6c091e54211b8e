//! Key-value storage engine contract.
//!
//! Every ledger in the relay sits on top of a single process-wide store with
//! these capabilities:
//!
//! - Tuple keys ([`Key`]) ordered part-wise, with prefix scans in key order
//! - A monotonically increasing versionstamp assigned on each commit
//! - Multi-key atomic transactions: a set of versionstamp checks plus a set of
//!   mutations, applied all-or-nothing ([`AtomicOperation`])
//! - Per-entry expiry, evaluated against an injected [`Clock`](crate::clock::Clock)
//!
//! `set_if_absent` (compare-and-set against absence) is derived from the
//! transaction primitive and is the only sanctioned way to implement a dedup
//! gate: a read followed by a write leaves a window where two concurrent
//! writers both observe absence.
//!
//! # Engines
//!
//! - [`MemoryStore`]: process-local, used by tests and ephemeral deployments
//! - [`FileStore`]: same semantics, with the full table persisted atomically
//!   after every successful commit

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors raised by a storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error reading or persisting the table.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine's lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// Persisted table was written by an incompatible version.
    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },

    /// An optimistic update kept losing to concurrent writers.
    #[error("too much contention on key {0}")]
    Contention(Key),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A tuple key, e.g. `["active_streams", "<broadcaster>", "<session>"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Vec<String>);

impl Key {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Key(parts.into_iter().map(Into::into).collect())
    }

    /// The empty key; as a prefix it matches every entry.
    pub fn root() -> Self {
        Key(Vec::new())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Returns true if `self` begins with every part of `prefix`.
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// A committed write's version. Strictly increasing across commits.
pub type Versionstamp = u64;

/// A live value and the version of the commit that wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    pub value: serde_json::Value,
    pub versionstamp: Versionstamp,
}

impl VersionedValue {
    /// Deserializes the stored JSON into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// A single write inside an [`AtomicOperation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Set {
        key: Key,
        value: serde_json::Value,
        expires_at: Option<DateTime<Utc>>,
    },
    Delete {
        key: Key,
    },
}

/// Precondition on the current version of a key.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub key: Key,
    /// `None` asserts the key is absent (or expired).
    pub versionstamp: Option<Versionstamp>,
}

/// All-or-nothing multi-key transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicOperation {
    pub checks: Vec<Check>,
    pub mutations: Vec<Mutation>,
}

impl AtomicOperation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `key` to be at `versionstamp` (or absent, for `None`).
    pub fn check(mut self, key: Key, versionstamp: Option<Versionstamp>) -> Self {
        self.checks.push(Check { key, versionstamp });
        self
    }

    pub fn set<T: Serialize>(self, key: Key, value: &T) -> Result<Self> {
        self.set_inner(key, value, None)
    }

    /// Sets a value that disappears once `expires_at` has passed.
    pub fn set_expiring<T: Serialize>(
        self,
        key: Key,
        value: &T,
        expires_at: DateTime<Utc>,
    ) -> Result<Self> {
        self.set_inner(key, value, Some(expires_at))
    }

    fn set_inner<T: Serialize>(
        mut self,
        key: Key,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        self.mutations.push(Mutation::Set {
            key,
            value: serde_json::to_value(value)?,
            expires_at,
        });
        Ok(self)
    }

    pub fn delete(mut self, key: Key) -> Self {
        self.mutations.push(Mutation::Delete { key });
        self
    }
}

/// Outcome of [`KvStore::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every check held; all mutations were applied at this version.
    Committed(Versionstamp),
    /// At least one check failed; nothing was written.
    CheckFailed,
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }
}

/// The storage engine contract.
///
/// Implementations must make `commit` linearizable: checks are evaluated and
/// mutations applied as one step with respect to every other commit.
pub trait KvStore: Send + Sync {
    /// Reads a live entry.
    fn get(&self, key: &Key) -> Result<Option<VersionedValue>>;

    /// Lists live entries whose key starts with `prefix`, in key order.
    fn list(&self, prefix: &Key) -> Result<Vec<(Key, VersionedValue)>>;

    /// Applies an atomic operation.
    fn commit(&self, op: AtomicOperation) -> Result<CommitOutcome>;

    /// Unconditionally writes `value` at `key`.
    fn set(&self, key: Key, value: &serde_json::Value) -> Result<Versionstamp> {
        match self.commit(AtomicOperation::new().set(key, value)?)? {
            CommitOutcome::Committed(v) => Ok(v),
            // No checks were attached, so this cannot happen.
            CommitOutcome::CheckFailed => Ok(0),
        }
    }

    /// Writes `value` at `key`; it expires at `expires_at`.
    fn set_with_expiry(
        &self,
        key: Key,
        value: &serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<Versionstamp> {
        match self.commit(AtomicOperation::new().set_expiring(key, value, expires_at)?)? {
            CommitOutcome::Committed(v) => Ok(v),
            CommitOutcome::CheckFailed => Ok(0),
        }
    }

    /// Writes `value` only if `key` is currently absent.
    ///
    /// Returns `true` if this call created the entry.
    fn set_if_absent(
        &self,
        key: Key,
        value: &serde_json::Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let op = AtomicOperation::new().check(key.clone(), None);
        let op = match expires_at {
            Some(at) => op.set_expiring(key, value, at)?,
            None => op.set(key, value)?,
        };
        Ok(self.commit(op)?.is_committed())
    }

    /// Removes `key`. Deleting an absent key succeeds.
    fn delete(&self, key: Key) -> Result<()> {
        self.commit(AtomicOperation::new().delete(key))?;
        Ok(())
    }
}

/// Deletes every live entry under `prefix` in one atomic transaction.
///
/// The transaction asserts the versionstamp of every entry it read, so a
/// concurrent write to any of them causes a retry rather than a partial
/// clear. Keys created after the scan are not part of the snapshot and
/// survive. Returns the number of entries removed.
pub fn clear_prefix(store: &dyn KvStore, prefix: &Key) -> Result<usize> {
    const MAX_ATTEMPTS: usize = 8;

    for _ in 0..MAX_ATTEMPTS {
        let entries = store.list(prefix)?;
        if entries.is_empty() {
            return Ok(0);
        }

        let count = entries.len();
        let op = entries
            .into_iter()
            .fold(AtomicOperation::new(), |op, (key, entry)| {
                op.check(key.clone(), Some(entry.versionstamp)).delete(key)
            });

        if store.commit(op)?.is_committed() {
            return Ok(count);
        }
    }

    Err(StoreError::Contention(prefix.clone()))
}
