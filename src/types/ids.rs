//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! ServerId where a ChannelId is expected). All provider and chat identifiers
//! are opaque strings: we never parse them, only compare and forward them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                $name(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// A streaming-provider broadcaster (Twitch `broadcaster_user_id`).
    ///
    /// Issued by the provider and immutable; this is the key every ledger
    /// entry for a stream source hangs off.
    BroadcasterId
);

string_id!(
    /// A subscribing chat server (one Discord guild).
    ServerId
);

string_id!(
    /// One continuous live broadcast, as identified by the provider's stream id.
    SessionId
);

string_id!(
    /// A chat channel that notifications are delivered to.
    ChannelId
);

string_id!(
    /// A message posted by the messaging gateway.
    MessageId
);
