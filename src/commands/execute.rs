//! Runs commands against the ledgers.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::error::CommandError;
use super::parser::parse_command;
use super::types::{Command, Interaction, InteractionKind, InteractionResponse};
use crate::gateways::StreamProvider;
use crate::ledger::{AddOutcome, Ledgers, NotifyConfig};
use crate::types::{ChannelId, ServerId};

pub struct CommandExecutor<P> {
    ledgers: Ledgers,
    provider: Arc<P>,
}

impl<P> Clone for CommandExecutor<P> {
    fn clone(&self) -> Self {
        CommandExecutor {
            ledgers: self.ledgers.clone(),
            provider: self.provider.clone(),
        }
    }
}

impl<P: StreamProvider> CommandExecutor<P> {
    pub fn new(ledgers: Ledgers, provider: Arc<P>) -> Self {
        CommandExecutor { ledgers, provider }
    }

    /// Answers an authenticated interaction. Never fails: errors become
    /// ephemeral replies.
    pub async fn handle(&self, interaction: &Interaction) -> InteractionResponse {
        match interaction.kind() {
            InteractionKind::Ping => InteractionResponse::pong(),
            InteractionKind::ApplicationCommand => match self.run(interaction).await {
                Ok(text) => InteractionResponse::message(text),
                Err(e) => {
                    warn!(
                        server = interaction.guild_id.as_ref().map(|g| g.as_str()).unwrap_or("-"),
                        error = %e,
                        "Command failed"
                    );
                    InteractionResponse::ephemeral(e.user_message())
                }
            },
            InteractionKind::Other(kind) => {
                warn!(kind, "Unsupported interaction type");
                InteractionResponse::ephemeral("This interaction is not supported.")
            }
        }
    }

    async fn run(&self, interaction: &Interaction) -> Result<String, CommandError> {
        let server = interaction.guild_id.as_ref().ok_or(CommandError::NotInGuild)?;
        let data = interaction
            .data
            .as_ref()
            .ok_or(CommandError::MissingOption("data"))?;
        let command = parse_command(data)?;
        self.execute(server, &command).await
    }

    /// Executes `command` on behalf of `server` and returns the reply text.
    #[instrument(skip(self, server), fields(server = %server))]
    pub async fn execute(&self, server: &ServerId, command: &Command) -> Result<String, CommandError> {
        match command {
            Command::AddStreamer { login } => self.add_streamer(server, login).await,
            Command::RemoveStreamer { login } => self.remove_streamer(server, login).await,
            Command::NotifySettings { channel, rules } => self.notify_settings(server, channel, rules),
        }
    }

    async fn add_streamer(&self, server: &ServerId, login: &str) -> Result<String, CommandError> {
        let profile = self
            .provider
            .resolve_login(login)
            .await?
            .ok_or_else(|| CommandError::UnknownStreamer(login.to_string()))?;

        let secret = self.ledgers.secrets.get_or_create(&profile.id)?;
        self.provider
            .subscribe_stream_events(&profile.id, &secret)
            .await?;

        match self.ledgers.subscriptions.add(&profile.id, server)? {
            AddOutcome::Added => {
                info!(broadcaster = %profile.id, login, "Streamer added");
                Ok(format!(
                    "Added **{}**. This server will be notified when they go live.",
                    profile.display_name
                ))
            }
            AddOutcome::AlreadyPresent => Ok(format!(
                "**{}** is already registered for this server.",
                profile.display_name
            )),
        }
    }

    async fn remove_streamer(&self, server: &ServerId, login: &str) -> Result<String, CommandError> {
        let profile = self
            .provider
            .resolve_login(login)
            .await?
            .ok_or_else(|| CommandError::UnknownStreamer(login.to_string()))?;

        if self.ledgers.subscriptions.remove(&profile.id, server)? {
            info!(broadcaster = %profile.id, login, "Streamer removed");
            Ok(format!("Removed **{}**.", profile.display_name))
        } else {
            Ok(format!(
                "**{}** was not registered for this server.",
                profile.display_name
            ))
        }
    }

    fn notify_settings(
        &self,
        server: &ServerId,
        channel: &ChannelId,
        rules: &[String],
    ) -> Result<String, CommandError> {
        let config = NotifyConfig::new(channel.clone(), rules.to_vec());
        self.ledgers.server_configs.set(server, &config)?;
        info!(channel = %channel, rules = rules.len(), "Notification settings saved");

        Ok(match &config.rules {
            None => format!("Notifications will be sent to <#{channel}> for every stream."),
            Some(rules) => format!(
                "Notifications will be sent to <#{channel}> when the title contains any of: {}",
                rules
                    .iter()
                    .map(|r| format!("`{r}`"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
    }
}
