//! Discord REST client (API v10).

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::embed::Embed;
use super::error::GatewayError;
use super::retry::{RetryConfig, RetryPolicy, retry_with_backoff};
use super::{MessagingGateway, Result};
use crate::types::{ChannelId, MessageId};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    retry: RetryConfig,
    policy: RetryPolicy,
}

impl DiscordClient {
    pub fn new(config: DiscordConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bot {}", config.bot_token.trim()))
            .map_err(|_| GatewayError::permanent("bot token is not a valid header value"))?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(GatewayError::from_reqwest)?;

        Ok(DiscordClient {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry: RetryConfig::DEFAULT,
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig, policy: RetryPolicy) -> Self {
        self.retry = retry;
        self.policy = policy;
        self
    }

    async fn create_message(&self, channel: &ChannelId, body: serde_json::Value) -> Result<MessageId> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel);

        retry_with_backoff(self.retry, self.policy, || async {
            let response = self.http.post(&url).json(&body).send().await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(GatewayError::from_status(status.as_u16(), &text));
            }
            let created: CreatedMessage = response.json().await?;
            Ok(MessageId::new(created.id))
        })
        .await
        .into_result()
    }
}

impl MessagingGateway for DiscordClient {
    #[instrument(skip(self, text), fields(channel = %channel))]
    async fn send_plain(&self, channel: &ChannelId, text: &str) -> Result<MessageId> {
        self.create_message(channel, json!({ "content": text })).await
    }

    #[instrument(skip(self, text, embed), fields(channel = %channel))]
    async fn send_rich(&self, channel: &ChannelId, text: &str, embed: &Embed) -> Result<MessageId> {
        let message = self
            .create_message(channel, json!({ "content": text, "embeds": [embed] }))
            .await?;
        debug!(message = %message, "Posted notification");
        Ok(message)
    }

    #[instrument(skip(self), fields(channel = %channel, message = %message))]
    async fn add_marker(&self, channel: &ChannelId, message: &MessageId, marker: &str) -> Result<()> {
        let url = format!(
            "{}/channels/{}/messages/{}/reactions/{}/@me",
            self.api_base,
            channel,
            message,
            urlencoding::encode(marker)
        );

        retry_with_backoff(self.retry, self.policy, || async {
            let response = self.http.put(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(GatewayError::from_status(status.as_u16(), &text));
            }
            Ok(())
        })
        .await
        .into_result()
    }
}
