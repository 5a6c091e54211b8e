//! Which message was posted where, per (broadcaster, server).
//!
//! Written after a successful delivery and consumed by the end-of-stream
//! path to find the message to mark. There is at most one entry per pair: a
//! second live session announced to the same server before the first ended
//! overwrites the first entry, and only the newer message is marked.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{Key, KvStore, Result};
use crate::types::{BroadcasterId, ChannelId, MessageId, ServerId, SessionId};

const NAMESPACE: &str = "notification";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredNotification {
    pub broadcaster_id: BroadcasterId,
    pub server_id: ServerId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DeliveredNotificationLedger {
    store: Arc<dyn KvStore>,
}

impl DeliveredNotificationLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        DeliveredNotificationLedger { store }
    }

    fn key(broadcaster: &BroadcasterId, server: &ServerId) -> Key {
        Key::new([NAMESPACE, broadcaster.as_str(), server.as_str()])
    }

    /// Records a delivery, replacing any previous entry for the pair.
    pub fn record(&self, entry: &DeliveredNotification) -> Result<()> {
        let key = Self::key(&entry.broadcaster_id, &entry.server_id);

        if let Some(previous) = self.store.get(&key)?
            && let Ok(previous) = previous.decode::<DeliveredNotification>()
            && previous.message_id != entry.message_id
        {
            warn!(
                broadcaster = %entry.broadcaster_id,
                server = %entry.server_id,
                previous_message = %previous.message_id,
                message = %entry.message_id,
                "Overwriting undelivered end marker for earlier notification"
            );
        }

        self.store.set(key, &serde_json::to_value(entry)?)?;
        Ok(())
    }

    pub fn get(
        &self,
        broadcaster: &BroadcasterId,
        server: &ServerId,
    ) -> Result<Option<DeliveredNotification>> {
        self.store
            .get(&Self::key(broadcaster, server))?
            .map(|v| v.decode())
            .transpose()
    }

    pub fn remove(&self, broadcaster: &BroadcasterId, server: &ServerId) -> Result<()> {
        self.store.delete(Self::key(broadcaster, server))
    }

    /// Every entry recorded for `broadcaster`, in server key order.
    ///
    /// Includes servers that have since unsubscribed.
    pub fn list_for(&self, broadcaster: &BroadcasterId) -> Result<Vec<DeliveredNotification>> {
        self.store
            .list(&Key::new([NAMESPACE, broadcaster.as_str()]))?
            .into_iter()
            .map(|(_, v)| v.decode())
            .collect()
    }
}
