//! Core domain types shared across the relay.

pub mod ids;

pub use ids::{BroadcasterId, ChannelId, MessageId, ServerId, SessionId};
