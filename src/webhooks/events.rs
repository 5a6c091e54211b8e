//! Typed EventSub payloads.
//!
//! Only the fields the relay acts on are modelled; everything else in the
//! envelope is ignored so provider additions never break parsing.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BroadcasterId, SessionId};

/// Value of the `Twitch-Eventsub-Message-Type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Subscription handshake: echo the challenge.
    Verification,
    /// An event for an active subscription.
    Notification,
    /// The provider revoked the subscription.
    Revocation,
}

impl MessageType {
    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "webhook_callback_verification" => Some(MessageType::Verification),
            "notification" => Some(MessageType::Notification),
            "revocation" => Some(MessageType::Revocation),
            _ => None,
        }
    }

    pub fn as_header(&self) -> &'static str {
        match self {
            MessageType::Verification => "webhook_callback_verification",
            MessageType::Notification => "notification",
            MessageType::Revocation => "revocation",
        }
    }
}

/// The subscription type a delivery belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// `stream.online`
    StreamOnline,
    /// `stream.offline`
    StreamOffline,
    /// Any type the relay does not act on.
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::StreamOnline => "stream.online",
            EventKind::StreamOffline => "stream.offline",
            EventKind::Other(s) => s,
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "stream.online" => EventKind::StreamOnline,
            "stream.offline" => EventKind::StreamOffline,
            _ => EventKind::Other(s),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub broadcaster_user_id: Option<BroadcasterId>,
}

/// The `subscription` object present in every delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub condition: Condition,
}

/// The `event` object of `stream.online` and `stream.offline`.
///
/// Offline events carry only the broadcaster fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// The stream id; present on `stream.online` only.
    #[serde(default)]
    pub id: Option<SessionId>,
    pub broadcaster_user_id: BroadcasterId,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    /// `live`, `playlist`, `watch_party`, ...
    #[serde(default, rename = "type")]
    pub stream_type: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// The raw JSON envelope.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Envelope {
    pub subscription: SubscriptionDescriptor,
    #[serde(default)]
    pub event: Option<serde_json::Value>,
    #[serde(default)]
    pub challenge: Option<String>,
}
