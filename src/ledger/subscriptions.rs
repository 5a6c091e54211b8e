//! Broadcaster → subscribing servers.
//!
//! Stored as one list value per broadcaster. Membership changes are
//! read-modify-write transactions guarded by the versionstamp that was read,
//! so two registrations racing on the same broadcaster cannot drop each
//! other's server: the loser's check fails and it retries against the new
//! list.

use std::sync::Arc;

use tracing::{debug, info};

use super::MAX_CAS_ATTEMPTS;
use crate::store::{AtomicOperation, Key, KvStore, Result, StoreError, Versionstamp, clear_prefix};
use crate::types::{BroadcasterId, ServerId};

const NAMESPACE: &str = "subscriptions";

/// Result of [`SubscriptionRegistry::add`]. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Clone)]
pub struct SubscriptionRegistry {
    store: Arc<dyn KvStore>,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        SubscriptionRegistry { store }
    }

    fn key(broadcaster: &BroadcasterId) -> Key {
        Key::new([NAMESPACE, broadcaster.as_str()])
    }

    fn read(&self, key: &Key) -> Result<(Vec<ServerId>, Option<Versionstamp>)> {
        match self.store.get(key)? {
            Some(v) => Ok((v.decode()?, Some(v.versionstamp))),
            None => Ok((Vec::new(), None)),
        }
    }

    /// Adds `server` to the broadcaster's subscriber set.
    pub fn add(&self, broadcaster: &BroadcasterId, server: &ServerId) -> Result<AddOutcome> {
        let key = Self::key(broadcaster);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let (mut servers, versionstamp) = self.read(&key)?;
            if servers.contains(server) {
                return Ok(AddOutcome::AlreadyPresent);
            }

            servers.push(server.clone());
            let op = AtomicOperation::new()
                .check(key.clone(), versionstamp)
                .set(key.clone(), &servers)?;

            if self.store.commit(op)?.is_committed() {
                info!(broadcaster = %broadcaster, server = %server, "Subscription added");
                return Ok(AddOutcome::Added);
            }
            debug!(broadcaster = %broadcaster, "Subscription add lost a race, retrying");
        }

        Err(StoreError::Contention(key))
    }

    /// Servers subscribed to `broadcaster`, in insertion order.
    pub fn servers_for(&self, broadcaster: &BroadcasterId) -> Result<Vec<ServerId>> {
        Ok(self.read(&Self::key(broadcaster))?.0)
    }

    /// Removes `server` from the set. Returns `false` if it was not a member.
    ///
    /// The key is deleted once the set is empty.
    pub fn remove(&self, broadcaster: &BroadcasterId, server: &ServerId) -> Result<bool> {
        let key = Self::key(broadcaster);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let (mut servers, versionstamp) = self.read(&key)?;
            let before = servers.len();
            servers.retain(|s| s != server);
            if servers.len() == before {
                return Ok(false);
            }

            let op = AtomicOperation::new().check(key.clone(), versionstamp);
            let op = if servers.is_empty() {
                op.delete(key.clone())
            } else {
                op.set(key.clone(), &servers)?
            };

            if self.store.commit(op)?.is_committed() {
                info!(broadcaster = %broadcaster, server = %server, "Subscription removed");
                return Ok(true);
            }
        }

        Err(StoreError::Contention(key))
    }

    /// Deletes every subscription in one atomic transaction.
    pub fn clear_all(&self) -> Result<usize> {
        let removed = clear_prefix(self.store.as_ref(), &Key::new([NAMESPACE]))?;
        info!(removed, "Cleared all subscriptions");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn add_is_idempotent() {
        let reg = registry();
        let b = BroadcasterId::new("b1");
        let g = ServerId::new("g1");

        assert_eq!(reg.add(&b, &g).unwrap(), AddOutcome::Added);
        assert_eq!(reg.add(&b, &g).unwrap(), AddOutcome::AlreadyPresent);
        assert_eq!(reg.servers_for(&b).unwrap(), vec![g]);
    }

    #[test]
    fn unknown_broadcaster_has_no_servers() {
        assert!(
            registry()
                .servers_for(&BroadcasterId::new("nobody"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn servers_keep_insertion_order() {
        let reg = registry();
        let b = BroadcasterId::new("b1");
        for g in ["g2", "g1", "g3"] {
            reg.add(&b, &ServerId::new(g)).unwrap();
        }

        let got: Vec<_> = reg
            .servers_for(&b)
            .unwrap()
            .into_iter()
            .map(|s| s.0)
            .collect();
        assert_eq!(got, vec!["g2", "g1", "g3"]);
    }

    #[test]
    fn remove_last_server_deletes_key() {
        let store = Arc::new(MemoryStore::new());
        let reg = SubscriptionRegistry::new(store.clone());
        let b = BroadcasterId::new("b1");
        reg.add(&b, &ServerId::new("g1")).unwrap();
        reg.add(&b, &ServerId::new("g2")).unwrap();

        assert!(reg.remove(&b, &ServerId::new("g1")).unwrap());
        assert_eq!(reg.servers_for(&b).unwrap(), vec![ServerId::new("g2")]);

        assert!(reg.remove(&b, &ServerId::new("g2")).unwrap());
        assert!(
            store
                .get(&Key::new(["subscriptions", "b1"]))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn remove_non_member_is_false() {
        let reg = registry();
        assert!(
            !reg.remove(&BroadcasterId::new("b1"), &ServerId::new("g1"))
                .unwrap()
        );
    }

    #[test]
    fn clear_all_leaves_other_namespaces() {
        let store = Arc::new(MemoryStore::new());
        let reg = SubscriptionRegistry::new(store.clone());
        reg.add(&BroadcasterId::new("b1"), &ServerId::new("g1"))
            .unwrap();
        reg.add(&BroadcasterId::new("b2"), &ServerId::new("g1"))
            .unwrap();
        store
            .set(Key::new(["server_config", "g1"]), &serde_json::json!({}))
            .unwrap();

        assert_eq!(reg.clear_all().unwrap(), 2);
        assert!(
            reg.servers_for(&BroadcasterId::new("b1"))
                .unwrap()
                .is_empty()
        );
        assert!(
            store
                .get(&Key::new(["server_config", "g1"]))
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_never_drop_a_winner() {
        let reg = registry();
        let b = BroadcasterId::new("b1");

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let reg = reg.clone();
                let b = b.clone();
                tokio::task::spawn_blocking(move || reg.add(&b, &ServerId::new(format!("g{i}"))))
            })
            .collect();

        let mut landed = Vec::new();
        for (i, h) in handles.into_iter().enumerate() {
            // Heavy contention may exhaust the retry budget; that is
            // reported, never silently lost.
            match h.await.unwrap() {
                Ok(_) => landed.push(ServerId::new(format!("g{i}"))),
                Err(StoreError::Contention(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        let servers = reg.servers_for(&b).unwrap();
        assert_eq!(servers.len(), landed.len());
        for server in &landed {
            assert!(servers.contains(server));
        }
    }
}
