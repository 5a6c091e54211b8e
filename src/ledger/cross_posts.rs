//! Guards against cross-posting the same session twice.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::store::{Key, KvStore, Result};
use crate::types::SessionId;

const NAMESPACE: &str = "x_posted_history";

/// How long a claim blocks further posts for the same session.
pub const CROSS_POST_TTL: Duration = Duration::hours(6);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CrossPostMark {
    claimed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CrossPostLedger {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl CrossPostLedger {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        CrossPostLedger { store, clock }
    }

    fn key(session: &SessionId) -> Key {
        Key::new([NAMESPACE, session.as_str()])
    }

    /// Claims the right to cross-post `session`.
    ///
    /// Returns `true` for exactly one caller until the claim expires or is
    /// released.
    pub fn claim(&self, session: &SessionId) -> Result<bool> {
        let now = self.clock.now();
        self.store.set_if_absent(
            Self::key(session),
            &serde_json::to_value(CrossPostMark { claimed_at: now })?,
            Some(now + CROSS_POST_TTL),
        )
    }

    pub fn is_posted(&self, session: &SessionId) -> Result<bool> {
        Ok(self.store.get(&Self::key(session))?.is_some())
    }

    /// Drops a claim whose post failed, so a later event can try again.
    pub fn release(&self, session: &SessionId) -> Result<()> {
        self.store.delete(Self::key(session))
    }
}
