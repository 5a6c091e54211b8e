//! Slash commands.
//!
//! Servers manage their notifications through application-command
//! interactions:
//!
//! - `/add-streamer twitch_username` - subscribe this server to a streamer
//! - `/remove-streamer twitch_username` - unsubscribe this server
//! - `/notify-settings channel [rules]` - choose the delivery channel and,
//!   optionally, comma-separated title filters
//!
//! Requests are authenticated with Ed25519 ([`verify_interaction`]) before
//! they are decoded.
//!
//! # Example
//!
//! ```
//! use live_relay::commands::{parse_command, Command, CommandData};
//! use live_relay::types::ChannelId;
//!
//! let data: CommandData = serde_json::from_value(serde_json::json!({
//!     "name": "notify-settings",
//!     "options": [
//!         { "name": "channel", "value": "987" },
//!         { "name": "rules", "value": "speedrun, any%" }
//!     ]
//! }))
//! .unwrap();
//!
//! assert_eq!(
//!     parse_command(&data).unwrap(),
//!     Command::NotifySettings {
//!         channel: ChannelId::new("987"),
//!         rules: vec!["speedrun".into(), "any%".into()],
//!     }
//! );
//! ```

mod error;
mod execute;
mod parser;
mod types;
mod verify;

pub use error::CommandError;
pub use execute::CommandExecutor;
pub use parser::{ADD_STREAMER, NOTIFY_SETTINGS, REMOVE_STREAMER, parse_command};
pub use types::{
    Command, CommandData, CommandOption, FLAG_EPHEMERAL, Interaction, InteractionKind,
    InteractionResponse, ResponseData,
};
pub use verify::{SIGNATURE_HEADER, TIMESTAMP_HEADER, parse_public_key, verify_interaction};

#[cfg(test)]
pub(crate) use verify::tests::{sign as sign_interaction, signing_key as interaction_signing_key};
