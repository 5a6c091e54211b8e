//! Shared test helpers: in-memory gateways, a wired-up dispatcher harness and
//! signed webhook builders.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::clock::ManualClock;
use crate::gateways::{
    BroadcasterProfile, Embed, GatewayError, Gateways, MessagingGateway, Result, SocialGateway,
    StreamInfo, StreamProvider,
};
use crate::ledger::{Ledgers, SigningSecret};
use crate::notify::{Dispatcher, DispatcherConfig};
use crate::store::{KvStore, MemoryStore};
use crate::types::{BroadcasterId, ChannelId, MessageId, SessionId};
use crate::webhooks::{InboundWebhook, WebhookHeaders, compute_signature, format_signature_header, parse_webhook};

// ─── Provider ───

#[derive(Debug, Default)]
pub struct MockProvider {
    streams: Mutex<HashMap<BroadcasterId, StreamInfo>>,
    profiles: Mutex<HashMap<String, BroadcasterProfile>>,
    subscribed: Mutex<Vec<BroadcasterId>>,
    fail_lookups: AtomicBool,
    fail_subscribe: AtomicBool,
}

impl MockProvider {
    pub fn set_live(&self, info: StreamInfo) {
        self.streams
            .lock()
            .unwrap()
            .insert(info.broadcaster_id.clone(), info);
    }

    pub fn set_offline(&self, broadcaster: &BroadcasterId) {
        self.streams.lock().unwrap().remove(broadcaster);
    }

    pub fn add_profile(&self, profile: BroadcasterProfile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.login.to_lowercase(), profile);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Broadcasters passed to `subscribe_stream_events`, in call order.
    pub fn subscribed(&self) -> Vec<BroadcasterId> {
        self.subscribed.lock().unwrap().clone()
    }
}

impl StreamProvider for MockProvider {
    async fn stream_info(&self, broadcaster: &BroadcasterId) -> Result<Option<StreamInfo>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(GatewayError::transient("stream lookup unavailable"));
        }
        Ok(self.streams.lock().unwrap().get(broadcaster).cloned())
    }

    async fn resolve_login(&self, login: &str) -> Result<Option<BroadcasterProfile>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(GatewayError::transient("user lookup unavailable"));
        }
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .get(&login.to_lowercase())
            .cloned())
    }

    async fn subscribe_stream_events(
        &self,
        broadcaster: &BroadcasterId,
        _secret: &SigningSecret,
    ) -> Result<()> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(GatewayError::permanent("subscription rejected"));
        }
        self.subscribed.lock().unwrap().push(broadcaster.clone());
        Ok(())
    }
}

// ─── Messaging ───

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: ChannelId,
    pub text: String,
    pub embed: Option<Embed>,
    pub id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedMarker {
    pub channel: ChannelId,
    pub message: MessageId,
    pub marker: String,
}

#[derive(Debug, Default)]
pub struct MockMessaging {
    sent: Mutex<Vec<SentMessage>>,
    markers: Mutex<Vec<AddedMarker>>,
    failing_channels: Mutex<HashSet<ChannelId>>,
    fail_markers: AtomicBool,
    next_id: AtomicU64,
}

impl MockMessaging {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn markers(&self) -> Vec<AddedMarker> {
        self.markers.lock().unwrap().clone()
    }

    /// Every send to `channel` fails from now on.
    pub fn fail_channel(&self, channel: &ChannelId) {
        self.failing_channels.lock().unwrap().insert(channel.clone());
    }

    pub fn fail_markers(&self, fail: bool) {
        self.fail_markers.store(fail, Ordering::SeqCst);
    }

    fn record(&self, channel: &ChannelId, text: &str, embed: Option<&Embed>) -> Result<MessageId> {
        if self.failing_channels.lock().unwrap().contains(channel) {
            return Err(GatewayError::from_status(403, "Missing Access"));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = MessageId::new(format!("msg-{n}"));
        self.sent.lock().unwrap().push(SentMessage {
            channel: channel.clone(),
            text: text.to_string(),
            embed: embed.cloned(),
            id: id.clone(),
        });
        Ok(id)
    }
}

impl MessagingGateway for MockMessaging {
    async fn send_plain(&self, channel: &ChannelId, text: &str) -> Result<MessageId> {
        self.record(channel, text, None)
    }

    async fn send_rich(&self, channel: &ChannelId, text: &str, embed: &Embed) -> Result<MessageId> {
        self.record(channel, text, Some(embed))
    }

    async fn add_marker(&self, channel: &ChannelId, message: &MessageId, marker: &str) -> Result<()> {
        if self.fail_markers.load(Ordering::SeqCst) {
            return Err(GatewayError::from_status(500, "Internal Server Error"));
        }
        self.markers.lock().unwrap().push(AddedMarker {
            channel: channel.clone(),
            message: message.clone(),
            marker: marker.to_string(),
        });
        Ok(())
    }
}

// ─── Social ───

#[derive(Debug, Default)]
pub struct MockSocial {
    posts: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MockSocial {
    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl SocialGateway for MockSocial {
    async fn post(&self, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::from_status(503, "Service Unavailable"));
        }
        self.posts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MockGateways;

impl Gateways for MockGateways {
    type Provider = MockProvider;
    type Messaging = MockMessaging;
    type Social = MockSocial;
}

// ─── Harness ───

/// A dispatcher over a memory store and mock gateways, with handles to
/// every piece for assertions.
pub struct Harness {
    pub dispatcher: Dispatcher<MockGateways>,
    pub store: Arc<MemoryStore>,
    pub ledgers: Ledgers,
    pub provider: Arc<MockProvider>,
    pub messaging: Arc<MockMessaging>,
    pub social: Arc<MockSocial>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        let clock = ManualClock::default();
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        let ledgers = Ledgers::new(store.clone() as Arc<dyn KvStore>, Arc::new(clock.clone()));
        let provider = Arc::new(MockProvider::default());
        let messaging = Arc::new(MockMessaging::default());
        let social = Arc::new(MockSocial::default());

        let dispatcher = Dispatcher::new(
            ledgers.clone(),
            provider.clone(),
            messaging.clone(),
            Some(social.clone()),
            config,
            Arc::new(clock.clone()),
        );

        Harness {
            dispatcher,
            store,
            ledgers,
            provider,
            messaging,
            social,
            clock,
        }
    }

    /// Stores a signing secret for `broadcaster` and returns it.
    pub fn register(&self, broadcaster: &str) -> SigningSecret {
        self.ledgers
            .secrets
            .get_or_create(&BroadcasterId::new(broadcaster))
            .unwrap()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Payloads ───

pub fn stream_info(broadcaster: &str, session: &str, title: &str) -> StreamInfo {
    StreamInfo {
        session_id: SessionId::new(session),
        broadcaster_id: BroadcasterId::new(broadcaster),
        user_login: format!("login_{broadcaster}"),
        user_name: format!("Name{broadcaster}"),
        title: title.to_string(),
        game_name: Some("Just Chatting".into()),
        tags: vec!["English".into()],
        thumbnail_url: Some(format!(
            "https://static-cdn.jtvnw.net/previews-ttv/live_user_{broadcaster}-{{width}}x{{height}}.jpg"
        )),
        started_at: None,
    }
}

fn subscription(kind: &str, broadcaster: &str) -> Value {
    json!({
        "id": format!("sub-{kind}-{broadcaster}"),
        "type": kind,
        "version": "1",
        "status": "enabled",
        "condition": { "broadcaster_user_id": broadcaster },
        "transport": { "method": "webhook", "callback": "https://relay.example.com/twitch/webhooks" },
        "created_at": "2024-01-01T00:00:00Z"
    })
}

pub fn online_body(broadcaster: &str, session: Option<&str>) -> Vec<u8> {
    let mut event = json!({
        "broadcaster_user_id": broadcaster,
        "broadcaster_user_login": format!("login_{broadcaster}"),
        "broadcaster_user_name": format!("Name{broadcaster}"),
        "type": "live",
        "started_at": "2024-01-01T12:00:00Z"
    });
    if let Some(session) = session {
        event["id"] = json!(session);
    }
    serde_json::to_vec(&json!({
        "subscription": subscription("stream.online", broadcaster),
        "event": event
    }))
    .unwrap()
}

pub fn offline_body(broadcaster: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "subscription": subscription("stream.offline", broadcaster),
        "event": {
            "broadcaster_user_id": broadcaster,
            "broadcaster_user_login": format!("login_{broadcaster}"),
            "broadcaster_user_name": format!("Name{broadcaster}")
        }
    }))
    .unwrap()
}

pub fn revocation_body(broadcaster: &str) -> Vec<u8> {
    let mut sub = subscription("stream.online", broadcaster);
    sub["status"] = json!("authorization_revoked");
    serde_json::to_vec(&json!({ "subscription": sub })).unwrap()
}

pub fn challenge_body(broadcaster: &str, challenge: &str) -> Vec<u8> {
    let mut sub = subscription("stream.online", broadcaster);
    sub["status"] = json!("webhook_callback_verification_pending");
    serde_json::to_vec(&json!({ "challenge": challenge, "subscription": sub })).unwrap()
}

/// A delivery's headers, signed with `secret`.
pub struct SignedHeaders {
    pub message_type: &'static str,
    pub message_id: String,
    pub timestamp: String,
    pub signature: String,
}

impl SignedHeaders {
    pub fn new(message_type: &'static str, message_id: &str, body: &[u8], secret: &SigningSecret) -> Self {
        let timestamp = "2024-01-01T12:00:01Z".to_string();
        let signature = format_signature_header(&compute_signature(
            message_id,
            &timestamp,
            body,
            secret.as_bytes(),
        ));
        SignedHeaders {
            message_type,
            message_id: message_id.to_string(),
            timestamp,
            signature,
        }
    }

    pub fn as_headers(&self) -> WebhookHeaders<'_> {
        WebhookHeaders {
            message_type: Some(self.message_type),
            message_id: Some(&self.message_id),
            timestamp: Some(&self.timestamp),
            signature: Some(&self.signature),
        }
    }
}

/// Parses `body` as a signed notification.
pub fn signed_notification(body: &[u8], secret: &SigningSecret) -> InboundWebhook {
    let headers = SignedHeaders::new("notification", "msg-id", body, secret);
    parse_webhook(&headers.as_headers(), body).unwrap()
}
