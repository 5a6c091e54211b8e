//! Interaction payloads and responses.
//!
//! Only the fields the relay reads are modelled.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ChannelId, ServerId};

/// `type` of an inbound interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Ping,
    ApplicationCommand,
    /// Components, autocomplete, modals: acknowledged but not handled.
    Other(u8),
}

impl From<u8> for InteractionKind {
    fn from(n: u8) -> Self {
        match n {
            1 => InteractionKind::Ping,
            2 => InteractionKind::ApplicationCommand,
            other => InteractionKind::Other(other),
        }
    }
}

/// An inbound interaction.
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub guild_id: Option<ServerId>,
    #[serde(default)]
    pub data: Option<CommandData>,
}

impl Interaction {
    pub fn kind(&self) -> InteractionKind {
        InteractionKind::from(self.kind)
    }
}

/// The invoked command and its options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandOption {
    pub name: String,
    /// Strings for STRING options, a snowflake string for CHANNEL options.
    #[serde(default)]
    pub value: Value,
}

/// A recognised slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/add-streamer twitch_username:<login>`
    AddStreamer { login: String },
    /// `/notify-settings channel:<channel> [rules:<a,b,c>]`
    ///
    /// An empty `rules` list means no filtering.
    NotifySettings {
        channel: ChannelId,
        rules: Vec<String>,
    },
    /// `/remove-streamer twitch_username:<login>`
    RemoveStreamer { login: String },
}

/// Response `type` 1: acknowledge a ping.
pub const RESPONSE_PONG: u8 = 1;
/// Response `type` 4: reply with a message.
pub const RESPONSE_CHANNEL_MESSAGE: u8 = 4;
/// Message flag: only the invoking user sees the reply.
pub const FLAG_EPHEMERAL: u64 = 1 << 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseData {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
}

impl InteractionResponse {
    pub fn pong() -> Self {
        InteractionResponse {
            kind: RESPONSE_PONG,
            data: None,
        }
    }

    pub fn message(content: impl Into<String>) -> Self {
        InteractionResponse {
            kind: RESPONSE_CHANNEL_MESSAGE,
            data: Some(ResponseData {
                content: content.into(),
                flags: None,
            }),
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        InteractionResponse {
            kind: RESPONSE_CHANNEL_MESSAGE,
            data: Some(ResponseData {
                content: content.into(),
                flags: Some(FLAG_EPHEMERAL),
            }),
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|d| d.flags)
            .is_some_and(|f| f & FLAG_EPHEMERAL != 0)
    }
}
