use thiserror::Error;

use crate::gateways::GatewayError;
use crate::store::StoreError;

/// Errors from decoding or executing a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("commands can only be used inside a server")]
    NotInGuild,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("missing required option `{0}`")]
    MissingOption(&'static str),

    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("no Twitch user named `{0}`")]
    UnknownStreamer(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("upstream error: {0}")]
    Gateway(#[from] GatewayError),
}

impl CommandError {
    /// Text shown to the invoking user.
    ///
    /// Internal faults get a generic message; the detail goes to the log.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Storage(_) | CommandError::InvalidPublicKey(_) => {
                "Something went wrong saving your settings. Please try again later.".to_string()
            }
            CommandError::Gateway(_) => {
                "Twitch could not be reached. Please try again later.".to_string()
            }
            other => format!("Error: {other}"),
        }
    }
}
