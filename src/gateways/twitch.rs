//! Twitch Helix and EventSub client.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::error::GatewayError;
use super::retry::{RetryConfig, RetryPolicy, retry_with_backoff};
use super::token::{AccessTokenCache, FetchedToken};
use super::{BroadcasterProfile, Result, StreamInfo, StreamProvider};
use crate::clock::Clock;
use crate::ledger::SigningSecret;
use crate::types::{BroadcasterId, SessionId};

pub const DEFAULT_API_BASE: &str = "https://api.twitch.tv/helix";
pub const DEFAULT_AUTH_BASE: &str = "https://id.twitch.tv/oauth2";

/// Subscription types created for every registered broadcaster.
pub const STREAM_EVENT_TYPES: [&str; 2] = ["stream.online", "stream.offline"];

#[derive(Debug, Clone)]
pub struct TwitchConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Public URL of the webhook route, registered as the EventSub callback.
    pub callback_url: String,
    pub api_base: String,
    pub auth_base: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct HelixPage<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct HelixStream {
    id: String,
    user_id: String,
    user_login: String,
    user_name: String,
    #[serde(default)]
    game_name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    thumbnail_url: String,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
}

impl From<HelixStream> for StreamInfo {
    fn from(s: HelixStream) -> Self {
        StreamInfo {
            session_id: SessionId::new(s.id),
            broadcaster_id: BroadcasterId::new(s.user_id),
            user_login: s.user_login,
            user_name: s.user_name,
            title: s.title,
            game_name: (!s.game_name.is_empty()).then_some(s.game_name),
            tags: s.tags.unwrap_or_default(),
            thumbnail_url: (!s.thumbnail_url.is_empty()).then_some(s.thumbnail_url),
            started_at: s.started_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HelixUser {
    id: String,
    login: String,
    display_name: String,
    #[serde(default)]
    profile_image_url: Option<String>,
}

pub struct TwitchClient {
    http: reqwest::Client,
    config: TwitchConfig,
    tokens: AccessTokenCache,
    retry: RetryConfig,
    policy: RetryPolicy,
}

impl TwitchClient {
    pub fn new(config: TwitchConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GatewayError::from_reqwest)?;

        Ok(TwitchClient {
            http,
            config: TwitchConfig {
                api_base: config.api_base.trim_end_matches('/').to_string(),
                auth_base: config.auth_base.trim_end_matches('/').to_string(),
                ..config
            },
            tokens: AccessTokenCache::new(clock),
            retry: RetryConfig::DEFAULT,
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig, policy: RetryPolicy) -> Self {
        self.retry = retry;
        self.policy = policy;
        self
    }

    async fn app_token(&self) -> Result<String> {
        self.tokens.get_or_refresh(|| self.fetch_app_token()).await
    }

    async fn fetch_app_token(&self) -> Result<FetchedToken> {
        let response = self
            .http
            .post(format!("{}/token", self.config.auth_base))
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), &body));
        }

        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "Fetched app access token");
        Ok(FetchedToken {
            value: token.access_token,
            expires_in: chrono::Duration::seconds(token.expires_in),
        })
    }

    /// Sends an authenticated request once. A 401 drops the cached token and
    /// is reported as transient so a retry fetches a fresh one.
    async fn send_once(
        &self,
        build: impl FnOnce(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let token = self.app_token().await?;
        let response = build(&self.http)
            .header("Client-Id", &self.config.client_id)
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Twitch rejected the app token, invalidating");
            self.tokens.invalidate().await;
            return Err(GatewayError {
                status_code: Some(401),
                ..GatewayError::transient("access token rejected")
            });
        }
        Ok(response)
    }

    async fn helix_get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.config.api_base, path);
        retry_with_backoff(self.retry, self.policy, || async {
            let response = self.send_once(|http| http.get(&url).query(query)).await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::from_status(status.as_u16(), &body));
            }
            Ok(response.json::<T>().await?)
        })
        .await
        .into_result()
    }

    async fn create_subscription(
        &self,
        kind: &str,
        broadcaster: &BroadcasterId,
        secret: &SigningSecret,
    ) -> Result<()> {
        let url = format!("{}/eventsub/subscriptions", self.config.api_base);
        let body = json!({
            "type": kind,
            "version": "1",
            "condition": { "broadcaster_user_id": broadcaster.as_str() },
            "transport": {
                "method": "webhook",
                "callback": self.config.callback_url,
                "secret": secret.expose(),
            }
        });

        retry_with_backoff(self.retry, self.policy, || async {
            let response = self.send_once(|http| http.post(&url).json(&body)).await?;
            match response.status() {
                s if s.is_success() => {
                    info!(broadcaster = %broadcaster, kind, "EventSub subscription created");
                    Ok(())
                }
                StatusCode::CONFLICT => {
                    debug!(broadcaster = %broadcaster, kind, "EventSub subscription already exists");
                    Ok(())
                }
                s => {
                    let body = response.text().await.unwrap_or_default();
                    Err(GatewayError::from_status(s.as_u16(), &body))
                }
            }
        })
        .await
        .into_result()
    }
}

impl std::fmt::Debug for TwitchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitchClient")
            .field("api_base", &self.config.api_base)
            .finish_non_exhaustive()
    }
}

impl StreamProvider for TwitchClient {
    #[instrument(skip(self), fields(broadcaster = %broadcaster))]
    async fn stream_info(&self, broadcaster: &BroadcasterId) -> Result<Option<StreamInfo>> {
        let page: HelixPage<HelixStream> = self
            .helix_get("/streams", &[("user_id", broadcaster.as_str())])
            .await?;
        Ok(page.data.into_iter().next().map(StreamInfo::from))
    }

    #[instrument(skip(self))]
    async fn resolve_login(&self, login: &str) -> Result<Option<BroadcasterProfile>> {
        let page: HelixPage<HelixUser> = self.helix_get("/users", &[("login", login)]).await?;
        Ok(page.data.into_iter().next().map(|u| BroadcasterProfile {
            id: BroadcasterId::new(u.id),
            login: u.login,
            display_name: u.display_name,
            profile_image_url: u.profile_image_url.filter(|s| !s.is_empty()),
        }))
    }

    #[instrument(skip(self, secret), fields(broadcaster = %broadcaster))]
    async fn subscribe_stream_events(
        &self,
        broadcaster: &BroadcasterId,
        secret: &SigningSecret,
    ) -> Result<()> {
        for kind in STREAM_EVENT_TYPES {
            self.create_subscription(kind, broadcaster, secret).await?;
        }
        Ok(())
    }
}
