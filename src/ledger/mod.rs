//! Typed ledgers over the shared key-value store.
//!
//! Each ledger owns one key namespace and is the only code that reads or
//! writes it:
//!
//! | Ledger                          | Key                                        |
//! |---------------------------------|--------------------------------------------|
//! | [`SecretStore`]                 | `signing_secret/<broadcaster>`             |
//! | [`SubscriptionRegistry`]        | `subscriptions/<broadcaster>`              |
//! | [`ServerConfigStore`]           | `server_config/<server>`                   |
//! | [`ActiveStreamTracker`]         | `active_streams/<broadcaster>/<session>`   |
//! | [`DeliveredNotificationLedger`] | `notification/<broadcaster>/<server>`      |
//! | [`CrossPostLedger`]             | `x_posted_history/<session>`               |
//!
//! The ledgers are cheap handles around an `Arc<dyn KvStore>`; cloning one
//! shares the underlying store. No ledger spans another's keys in a single
//! transaction, so each write is independently durable.

use std::sync::Arc;

use crate::clock::Clock;
use crate::store::KvStore;

pub mod active_streams;
pub mod cross_posts;
pub mod notifications;
pub mod secrets;
pub mod server_config;
pub mod subscriptions;

pub use active_streams::ActiveStreamTracker;
pub use cross_posts::{CROSS_POST_TTL, CrossPostLedger};
pub use notifications::{DeliveredNotification, DeliveredNotificationLedger};
pub use secrets::{SecretStore, SigningSecret};
pub use server_config::{NotifyConfig, ServerConfigStore};
pub use subscriptions::{AddOutcome, SubscriptionRegistry};

/// Optimistic read-modify-write loops give up after this many conflicts.
pub(crate) const MAX_CAS_ATTEMPTS: usize = 8;

/// Every ledger, built over one store.
#[derive(Clone)]
pub struct Ledgers {
    pub secrets: SecretStore,
    pub subscriptions: SubscriptionRegistry,
    pub server_configs: ServerConfigStore,
    pub active_streams: ActiveStreamTracker,
    pub notifications: DeliveredNotificationLedger,
    pub cross_posts: CrossPostLedger,
}

impl Ledgers {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Ledgers {
            secrets: SecretStore::new(store.clone()),
            subscriptions: SubscriptionRegistry::new(store.clone()),
            server_configs: ServerConfigStore::new(store.clone()),
            active_streams: ActiveStreamTracker::new(store.clone(), clock.clone()),
            notifications: DeliveredNotificationLedger::new(store.clone()),
            cross_posts: CrossPostLedger::new(store, clock),
        }
    }
}

impl std::fmt::Debug for Ledgers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledgers").finish_non_exhaustive()
    }
}
