//! In-process storage engine.
//!
//! [`Table`] holds the commit logic shared by both engines; [`MemoryStore`]
//! wraps it in a mutex and nothing else.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    AtomicOperation, CommitOutcome, Key, KvStore, Mutation, Result, StoreError, VersionedValue,
    Versionstamp,
};
use crate::clock::{Clock, SystemClock};

/// A stored entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Entry {
    pub value: serde_json::Value,
    pub versionstamp: Versionstamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn versioned(&self) -> VersionedValue {
        VersionedValue {
            value: self.value.clone(),
            versionstamp: self.versionstamp,
        }
    }
}

/// The ordered table plus the versionstamp counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Table {
    pub entries: BTreeMap<Key, Entry>,
    pub last_versionstamp: Versionstamp,
}

impl Table {
    pub fn get(&self, key: &Key, now: DateTime<Utc>) -> Option<VersionedValue> {
        self.entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(Entry::versioned)
    }

    pub fn list(&self, prefix: &Key, now: DateTime<Utc>) -> Vec<(Key, VersionedValue)> {
        self.entries
            .range((Bound::Included(prefix.clone()), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, e)| e.is_live(now))
            .map(|(key, e)| (key.clone(), e.versioned()))
            .collect()
    }

    /// Evaluates every check, then applies every mutation under one new
    /// versionstamp. Expired entries are dropped as they are encountered.
    pub fn commit(&mut self, op: AtomicOperation, now: DateTime<Utc>) -> CommitOutcome {
        for check in &op.checks {
            let current = self.get(&check.key, now).map(|v| v.versionstamp);
            if current != check.versionstamp {
                return CommitOutcome::CheckFailed;
            }
        }

        self.last_versionstamp += 1;
        let versionstamp = self.last_versionstamp;

        for mutation in op.mutations {
            match mutation {
                Mutation::Set {
                    key,
                    value,
                    expires_at,
                } => {
                    self.entries.insert(
                        key,
                        Entry {
                            value,
                            versionstamp,
                            expires_at,
                        },
                    );
                }
                Mutation::Delete { key } => {
                    self.entries.remove(&key);
                }
            }
        }

        self.entries.retain(|_, e| e.is_live(now));
        CommitOutcome::Committed(versionstamp)
    }
}

/// Process-local store. Contents are lost when the process exits.
pub struct MemoryStore {
    table: Mutex<Table>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store whose expiry decisions use `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        MemoryStore {
            table: Mutex::new(Table::default()),
            clock,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl KvStore for MemoryStore {
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
        Ok(table.commit(op, self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::clear_prefix;
    use chrono::Duration;
    use serde_json::json;

    fn store_with_clock() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::default();
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn set_then_get() {
        let store = MemoryStore::new();
        let key = Key::new(["a", "b"]);
        let v = store.set(key.clone(), &json!({"x": 1})).unwrap();

        let got = store.get(&key).unwrap().unwrap();
        assert_eq!(got.value, json!({"x": 1}));
        assert_eq!(got.versionstamp, v);
    }

    #[test]
    fn versionstamps_increase() {
        let store = MemoryStore::new();
        let v1 = store.set(Key::new(["a"]), &json!(1)).unwrap();
        let v2 = store.set(Key::new(["b"]), &json!(2)).unwrap();
        assert!(v2 > v1);
    }

    #[test]
    fn delete_missing_key_is_ok() {
        let store = MemoryStore::new();
        store.delete(Key::new(["nothing"])).unwrap();
    }

    #[test]
    fn set_if_absent_only_first_writer_wins() {
        let store = MemoryStore::new();
        let key = Key::new(["gate"]);

        assert!(store.set_if_absent(key.clone(), &json!(true), None).unwrap());
        assert!(!store.set_if_absent(key.clone(), &json!(true), None).unwrap());

        store.delete(key.clone()).unwrap();
        assert!(store.set_if_absent(key, &json!(true), None).unwrap());
    }

    #[test]
    fn failed_check_writes_nothing() {
        let store = MemoryStore::new();
        let existing = Key::new(["existing"]);
        store.set(existing.clone(), &json!(1)).unwrap();

        let op = AtomicOperation::new()
            .check(existing.clone(), None)
            .set(Key::new(["other"]), &json!(2))
            .unwrap();
        assert_eq!(store.commit(op).unwrap(), CommitOutcome::CheckFailed);
        assert!(store.get(&Key::new(["other"])).unwrap().is_none());
    }

    #[test]
    fn stale_versionstamp_check_fails() {
        let store = MemoryStore::new();
        let key = Key::new(["k"]);
        let v1 = store.set(key.clone(), &json!(1)).unwrap();
        store.set(key.clone(), &json!(2)).unwrap();

        let op = AtomicOperation::new()
            .check(key.clone(), Some(v1))
            .set(key.clone(), &json!(3))
            .unwrap();
        assert_eq!(store.commit(op).unwrap(), CommitOutcome::CheckFailed);
        assert_eq!(store.get(&key).unwrap().unwrap().value, json!(2));
    }

    #[test]
    fn list_returns_prefix_in_order() {
        let store = MemoryStore::new();
        store.set(Key::new(["p", "b"]), &json!(2)).unwrap();
        store.set(Key::new(["p", "a"]), &json!(1)).unwrap();
        store.set(Key::new(["q", "a"]), &json!(3)).unwrap();
        store.set(Key::new(["pp"]), &json!(4)).unwrap();

        let keys: Vec<_> = store
            .list(&Key::new(["p"]))
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![Key::new(["p", "a"]), Key::new(["p", "b"])]);
    }

    #[test]
    fn expired_entries_are_invisible() {
        let (store, clock) = store_with_clock();
        let key = Key::new(["ttl"]);
        let expires = clock.now() + Duration::hours(6);
        store.set_with_expiry(key.clone(), &json!(true), expires).unwrap();

        clock.advance(Duration::hours(5));
        assert!(store.get(&key).unwrap().is_some());

        clock.advance(Duration::hours(1));
        assert!(store.get(&key).unwrap().is_none());
        assert!(store.list(&Key::root()).unwrap().is_empty());
        // An expired key counts as absent for compare-and-set.
        assert!(store.set_if_absent(key, &json!(true), None).unwrap());
    }

    #[test]
    fn clear_prefix_removes_only_prefix() {
        let store = MemoryStore::new();
        store.set(Key::new(["subscriptions", "b1"]), &json!([])).unwrap();
        store.set(Key::new(["subscriptions", "b2"]), &json!([])).unwrap();
        store.set(Key::new(["server_config", "g1"]), &json!({})).unwrap();

        let removed = clear_prefix(&store, &Key::new(["subscriptions"])).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.list(&Key::root()).unwrap().len(), 1);
    }

    #[test]
    fn clear_prefix_on_empty_store() {
        let store = MemoryStore::new();
        assert_eq!(clear_prefix(&store, &Key::root()).unwrap(), 0);
    }
}
