//! Outbound collaborators.
//!
//! The dispatcher talks to three external systems through traits:
//!
//! - [`StreamProvider`]: stream lookups and subscription management (Twitch)
//! - [`MessagingGateway`]: posting and marking chat messages (Discord)
//! - [`SocialGateway`]: posting to a social network (X)
//!
//! [`Gateways`] bundles one implementation of each as associated types, so the
//! dispatcher and router are generic over a single parameter. Production
//! binds [`LiveGateways`]; tests bind in-memory mocks.
//!
//! All methods return `impl Future + Send` rather than boxed futures.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::ledger::SigningSecret;
use crate::types::{BroadcasterId, ChannelId, MessageId, SessionId};

pub mod discord;
pub mod embed;
pub mod error;
pub mod retry;
pub mod token;
pub mod twitch;
pub mod x;

pub use discord::{DiscordClient, DiscordConfig};
pub use embed::{Embed, EmbedAuthor, EmbedField, EmbedImage};
pub use error::{GatewayError, GatewayErrorKind};
pub use retry::{RetryConfig, RetryPolicy, RetryResult, retry_with_backoff};
pub use token::{AccessTokenCache, FetchedToken, REFRESH_MARGIN, TokenState};
pub use twitch::{TwitchClient, TwitchConfig};
pub use x::{XClient, XConfig, XCredentials};

/// Result type for gateway calls.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// A live stream, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub session_id: SessionId,
    pub broadcaster_id: BroadcasterId,
    pub user_login: String,
    pub user_name: String,
    pub title: String,
    pub game_name: Option<String>,
    pub tags: Vec<String>,
    /// Template URL containing `{width}` and `{height}` placeholders.
    pub thumbnail_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// A broadcaster account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcasterProfile {
    pub id: BroadcasterId,
    pub login: String,
    pub display_name: String,
    pub profile_image_url: Option<String>,
}

/// The streaming platform.
pub trait StreamProvider: Send + Sync + 'static {
    /// The broadcaster's current live session, or `None` when offline.
    fn stream_info(
        &self,
        broadcaster: &BroadcasterId,
    ) -> impl Future<Output = Result<Option<StreamInfo>>> + Send;

    /// Looks up an account by login name.
    fn resolve_login(
        &self,
        login: &str,
    ) -> impl Future<Output = Result<Option<BroadcasterProfile>>> + Send;

    /// Creates start and end event subscriptions signed with `secret`.
    ///
    /// Subscriptions that already exist count as success.
    fn subscribe_stream_events(
        &self,
        broadcaster: &BroadcasterId,
        secret: &SigningSecret,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// The chat platform.
pub trait MessagingGateway: Send + Sync + 'static {
    fn send_plain(
        &self,
        channel: &ChannelId,
        text: &str,
    ) -> impl Future<Output = Result<MessageId>> + Send;

    fn send_rich(
        &self,
        channel: &ChannelId,
        text: &str,
        embed: &Embed,
    ) -> impl Future<Output = Result<MessageId>> + Send;

    /// Annotates an existing message (a reaction on Discord).
    fn add_marker(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        marker: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// The social network used for cross-posts.
pub trait SocialGateway: Send + Sync + 'static {
    fn post(&self, text: &str) -> impl Future<Output = Result<()>> + Send;
}

/// One implementation of each collaborator.
pub trait Gateways: Send + Sync + 'static {
    type Provider: StreamProvider;
    type Messaging: MessagingGateway;
    type Social: SocialGateway;
}

/// The production bindings.
#[derive(Debug, Clone, Copy)]
pub struct LiveGateways;

impl Gateways for LiveGateways {
    type Provider = TwitchClient;
    type Messaging = DiscordClient;
    type Social = XClient;
}
