//! Command-line and environment configuration.
//!
//! Every setting can be given as a flag or through the environment variable
//! named beside it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::gateways::{DiscordConfig, TwitchConfig, XConfig, XCredentials, discord, twitch, x};
use crate::notify::{CrossPostConfig, DEFAULT_CROSS_POST_PREFIX, DEFAULT_END_MARKER, DispatcherConfig};
use crate::types::BroadcasterId;

#[derive(Debug, Parser)]
#[command(
    name = "live-relay",
    about = "Relays Twitch go-live events to Discord servers",
    version
)]
pub struct Config {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// JSON file backing the key-value store.
    #[arg(long, env = "STORE_PATH", default_value = "data/store.json")]
    pub store_path: PathBuf,

    /// Timeout for every outbound HTTP request, in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    pub discord_bot_token: String,

    /// Hex-encoded Ed25519 key used to verify interactions.
    #[arg(long, env = "DISCORD_PUBLIC_KEY")]
    pub discord_public_key: String,

    #[arg(long, env = "DISCORD_API_BASE", default_value = discord::DEFAULT_API_BASE)]
    pub discord_api_base: String,

    #[arg(long, env = "TWITCH_CLIENT_ID")]
    pub twitch_client_id: String,

    #[arg(long, env = "TWITCH_CLIENT_SECRET", hide_env_values = true)]
    pub twitch_client_secret: String,

    /// Public URL of `POST /twitch/webhooks`, registered with EventSub.
    #[arg(long, env = "TWITCH_CALLBACK_URL")]
    pub twitch_callback_url: String,

    #[arg(long, env = "TWITCH_API_BASE", default_value = twitch::DEFAULT_API_BASE)]
    pub twitch_api_base: String,

    #[arg(long, env = "TWITCH_AUTH_BASE", default_value = twitch::DEFAULT_AUTH_BASE)]
    pub twitch_auth_base: String,

    #[arg(long, env = "X_CONSUMER_KEY", hide_env_values = true)]
    pub x_consumer_key: Option<String>,

    #[arg(long, env = "X_CONSUMER_SECRET", hide_env_values = true)]
    pub x_consumer_secret: Option<String>,

    #[arg(long, env = "X_ACCESS_TOKEN", hide_env_values = true)]
    pub x_access_token: Option<String>,

    #[arg(long, env = "X_ACCESS_SECRET", hide_env_values = true)]
    pub x_access_secret: Option<String>,

    /// Broadcaster whose streams are cross-posted to X.
    #[arg(long, env = "X_TARGET_TWITCH_ID")]
    pub x_target_twitch_id: Option<String>,

    #[arg(long, env = "X_API_BASE", default_value = x::DEFAULT_API_BASE)]
    pub x_api_base: String,

    #[arg(long, env = "X_POST_PREFIX", default_value = DEFAULT_CROSS_POST_PREFIX)]
    pub x_post_prefix: String,

    /// Reaction added to a notification when the stream ends.
    #[arg(long, env = "END_MARKER", default_value = DEFAULT_END_MARKER)]
    pub end_marker: String,

    /// Bearer token for the debug endpoints; they are disabled when unset.
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn twitch(&self) -> TwitchConfig {
        TwitchConfig {
            client_id: self.twitch_client_id.clone(),
            client_secret: self.twitch_client_secret.clone(),
            callback_url: self.twitch_callback_url.clone(),
            api_base: self.twitch_api_base.clone(),
            auth_base: self.twitch_auth_base.clone(),
            timeout: self.request_timeout(),
        }
    }

    pub fn discord(&self) -> DiscordConfig {
        DiscordConfig {
            bot_token: self.discord_bot_token.clone(),
            api_base: self.discord_api_base.clone(),
            timeout: self.request_timeout(),
        }
    }

    /// X client settings, or `None` unless all four credentials are set.
    pub fn x(&self) -> Option<XConfig> {
        Some(XConfig {
            credentials: XCredentials {
                consumer_key: non_empty(&self.x_consumer_key)?,
                consumer_secret: non_empty(&self.x_consumer_secret)?,
                access_token: non_empty(&self.x_access_token)?,
                access_token_secret: non_empty(&self.x_access_secret)?,
            },
            api_base: self.x_api_base.clone(),
            timeout: self.request_timeout(),
        })
    }

    /// Cross-posting is enabled only with complete X credentials and a target.
    pub fn cross_post(&self) -> Option<CrossPostConfig> {
        self.x()?;
        Some(CrossPostConfig {
            target: BroadcasterId::new(non_empty(&self.x_target_twitch_id)?),
            prefix: self.x_post_prefix.clone(),
        })
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            end_marker: self.end_marker.clone(),
            cross_post: self.cross_post(),
        }
    }
}
