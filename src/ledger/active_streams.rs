//! Dedup gate for stream announcements.
//!
//! A mark under `(broadcaster, session)` means "this session has been
//! announced". It is set with compare-and-set before any fan-out, so of two
//! concurrent start webhooks for the same session exactly one proceeds. Marks
//! carry no expiry: they live until the matching end event clears them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::store::{Key, KvStore, Result, clear_prefix};
use crate::types::{BroadcasterId, SessionId};

const NAMESPACE: &str = "active_streams";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStreamMark {
    pub marked_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ActiveStreamTracker {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl ActiveStreamTracker {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        ActiveStreamTracker { store, clock }
    }

    fn key(broadcaster: &BroadcasterId, session: &SessionId) -> Key {
        Key::new([NAMESPACE, broadcaster.as_str(), session.as_str()])
    }

    /// Sets the mark if no mark exists. Returns `true` if this call set it.
    pub fn mark_if_absent(&self, broadcaster: &BroadcasterId, session: &SessionId) -> Result<bool> {
        let mark = ActiveStreamMark {
            marked_at: self.clock.now(),
        };
        self.store.set_if_absent(
            Self::key(broadcaster, session),
            &serde_json::to_value(mark)?,
            None,
        )
    }

    pub fn is_active(&self, broadcaster: &BroadcasterId, session: &SessionId) -> Result<bool> {
        Ok(self.store.get(&Self::key(broadcaster, session))?.is_some())
    }

    pub fn clear(&self, broadcaster: &BroadcasterId, session: &SessionId) -> Result<()> {
        self.store.delete(Self::key(broadcaster, session))
    }

    /// Clears every mark for `broadcaster` atomically.
    ///
    /// Used when an end event arrives and the provider no longer reports the
    /// session it ended.
    pub fn clear_broadcaster(&self, broadcaster: &BroadcasterId) -> Result<usize> {
        let removed = clear_prefix(
            self.store.as_ref(),
            &Key::new([NAMESPACE, broadcaster.as_str()]),
        )?;
        debug!(broadcaster = %broadcaster, removed, "Cleared active stream marks");
        Ok(removed)
    }
}
