//! The event dispatcher.
//!
//! Every delivery moves through
//! `VERIFYING → AUTHENTICATED → {STARTED | ENDED | REVOKED} → DONE`. A failed
//! verification exits before any ledger is touched.
//!
//! # Started path
//!
//! 1. Resolve the session via the provider, falling back to the event's id
//! 2. Set the active-stream mark with compare-and-set; if it already existed
//!    the session was announced and the delivery is a duplicate
//! 3. Launch the cross-post (detached, never awaited)
//! 4. Fan out to every subscribing server concurrently and wait for all
//!
//! # Ended path
//!
//! 1. Clear the active-stream mark (the named session, or every mark for the
//!    broadcaster if the provider no longer reports one)
//! 2. For every subscribing server, and every server still holding a ledger
//!    entry, concurrently mark the recorded message and drop the entry
//!
//! Fan-out branches are isolated: a failure in one server is logged and
//! reported in the [`FanOutReport`], never propagated. Ledger writes are
//! independent, so a fault part-way through leaves the earlier writes in
//! place.

use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::compose::{RichMessage, cross_post_text, live_notification};
use super::rules::title_matches;
use crate::clock::Clock;
use crate::gateways::{Gateways, MessagingGateway, SocialGateway, StreamInfo, StreamProvider};
use crate::ledger::{CrossPostLedger, DeliveredNotification, Ledgers};
use crate::store::StoreError;
use crate::types::{BroadcasterId, MessageId, ServerId, SessionId};
use crate::webhooks::{InboundWebhook, NotificationEvent, StreamEvent, WebhookVerifier};

/// Errors that abort a whole delivery.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Bad signature, or no secret for the broadcaster.
    #[error("webhook signature verification failed")]
    Unauthenticated,

    /// A ledger the whole delivery depends on could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Why a server was passed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The server has no delivery channel configured.
    NotConfigured,
    /// None of the server's title rules matched.
    RulesNotMatched,
    /// The server filters on titles but the provider has not reported one
    /// yet.
    TitleUnavailable,
    /// Nothing was announced to the server for this broadcaster.
    NothingToMark,
}

/// What happened for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOutcome {
    Delivered(MessageId),
    Marked(MessageId),
    Skipped(SkipReason),
    Failed(String),
}

/// Per-server results of one fan-out, in subscription order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub servers: Vec<(ServerId, ServerOutcome)>,
}

impl FanOutReport {
    pub fn count(&self, pred: impl Fn(&ServerOutcome) -> bool) -> usize {
        self.servers.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn delivered(&self) -> usize {
        self.count(|o| matches!(o, ServerOutcome::Delivered(_)))
    }

    pub fn marked(&self) -> usize {
        self.count(|o| matches!(o, ServerOutcome::Marked(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ServerOutcome::Failed(_)))
    }

    pub fn outcome_for(&self, server: &ServerId) -> Option<&ServerOutcome> {
        self.servers
            .iter()
            .find(|(s, _)| s == server)
            .map(|(_, o)| o)
    }
}

/// Terminal state of a handled delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Verification handshake; respond with this value verbatim.
    Challenge(String),
    /// First start event for the session; fan-out ran.
    Announced {
        session: SessionId,
        report: FanOutReport,
    },
    /// The session was already announced; nothing was done.
    AlreadyAnnounced { session: SessionId },
    /// A start event with no identifiable session; nothing was done.
    NoSession,
    Ended { report: FanOutReport },
    Revoked,
    /// A subscription type the relay does not act on.
    Ignored { kind: String },
}

/// Cross-posting for one distinguished broadcaster.
#[derive(Debug, Clone)]
pub struct CrossPostConfig {
    pub target: BroadcasterId,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Reaction added to a notification when its stream ends.
    pub end_marker: String,
    pub cross_post: Option<CrossPostConfig>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            end_marker: super::compose::DEFAULT_END_MARKER.to_string(),
            cross_post: None,
        }
    }
}

pub struct Dispatcher<G: Gateways> {
    ledgers: Ledgers,
    verifier: WebhookVerifier,
    provider: Arc<G::Provider>,
    messaging: Arc<G::Messaging>,
    social: Option<Arc<G::Social>>,
    config: DispatcherConfig,
    clock: Arc<dyn Clock>,
}

impl<G: Gateways> Clone for Dispatcher<G> {
    fn clone(&self) -> Self {
        Dispatcher {
            ledgers: self.ledgers.clone(),
            verifier: self.verifier.clone(),
            provider: self.provider.clone(),
            messaging: self.messaging.clone(),
            social: self.social.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<G: Gateways> Dispatcher<G> {
    pub fn new(
        ledgers: Ledgers,
        provider: Arc<G::Provider>,
        messaging: Arc<G::Messaging>,
        social: Option<Arc<G::Social>>,
        config: DispatcherConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Dispatcher {
            verifier: WebhookVerifier::new(ledgers.secrets.clone()),
            ledgers,
            provider,
            messaging,
            social,
            config,
            clock,
        }
    }

    pub fn ledgers(&self) -> &Ledgers {
        &self.ledgers
    }

    /// Handles one parsed delivery. `body` is the raw request body, used
    /// only for signature verification.
    #[instrument(skip_all, fields(message_type = ?webhook.message_type(), subscription = %webhook.subscription().id))]
    pub async fn handle(
        &self,
        webhook: &InboundWebhook,
        body: &[u8],
    ) -> Result<DispatchOutcome, DispatchError> {
        match webhook {
            InboundWebhook::Challenge { challenge, .. } => {
                info!("Answering subscription verification challenge");
                Ok(DispatchOutcome::Challenge(challenge.clone()))
            }

            InboundWebhook::Revocation {
                delivery,
                subscription,
                broadcaster,
            } => {
                if !self.verifier.verify(broadcaster, delivery, body) {
                    return Err(DispatchError::Unauthenticated);
                }
                warn!(
                    broadcaster = %broadcaster,
                    kind = %subscription.kind,
                    status = subscription.status.as_deref().unwrap_or("unknown"),
                    "Subscription revoked by provider"
                );
                Ok(DispatchOutcome::Revoked)
            }

            InboundWebhook::Notification {
                delivery,
                broadcaster,
                event,
                ..
            } => {
                if !self.verifier.verify(broadcaster, delivery, body) {
                    return Err(DispatchError::Unauthenticated);
                }
                match event {
                    NotificationEvent::StreamOnline(e) => self.on_started(broadcaster, e).await,
                    NotificationEvent::StreamOffline(e) => self.on_ended(broadcaster, e).await,
                    NotificationEvent::Unsupported(kind) => {
                        debug!(kind = %kind, "Ignoring unsupported subscription type");
                        Ok(DispatchOutcome::Ignored { kind: kind.clone() })
                    }
                }
            }
        }
    }

    /// Current stream info, or the event's own fields if the lookup fails or
    /// reports the broadcaster offline.
    async fn resolve_stream(&self, broadcaster: &BroadcasterId, event: &StreamEvent) -> Option<StreamInfo> {
        match self.provider.stream_info(broadcaster).await {
            Ok(Some(info)) => return Some(info),
            Ok(None) => debug!(broadcaster = %broadcaster, "Provider reports no live stream"),
            Err(e) => warn!(broadcaster = %broadcaster, error = %e, "Stream lookup failed"),
        }

        let session = event.id.clone()?;
        Some(StreamInfo {
            session_id: session,
            broadcaster_id: broadcaster.clone(),
            user_login: event.broadcaster_user_login.clone(),
            user_name: event.broadcaster_user_name.clone(),
            title: String::new(),
            game_name: None,
            tags: Vec::new(),
            thumbnail_url: None,
            started_at: event.started_at,
        })
    }

    #[instrument(skip(self, event), fields(broadcaster = %broadcaster))]
    async fn on_started(
        &self,
        broadcaster: &BroadcasterId,
        event: &StreamEvent,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(info) = self.resolve_stream(broadcaster, event).await else {
            info!("Start event without an identifiable session, acknowledging");
            return Ok(DispatchOutcome::NoSession);
        };
        let session = info.session_id.clone();

        if !self.ledgers.active_streams.mark_if_absent(broadcaster, &session)? {
            info!(session = %session, "Session already announced, skipping");
            return Ok(DispatchOutcome::AlreadyAnnounced { session });
        }

        self.spawn_cross_post(broadcaster, &info);

        let servers = match self.ledgers.subscriptions.servers_for(broadcaster) {
            Ok(servers) => servers,
            Err(e) => {
                // Release the gate so the provider's retry can announce.
                if let Err(release) = self.ledgers.active_streams.clear(broadcaster, &session) {
                    warn!(session = %session, error = %release, "Failed to release active stream mark");
                }
                return Err(e.into());
            }
        };

        if servers.is_empty() {
            info!(session = %session, "No subscribed servers");
            return Ok(DispatchOutcome::Announced {
                session,
                report: FanOutReport::default(),
            });
        }

        let message = live_notification(&info);
        let outcomes = join_all(
            servers
                .iter()
                .map(|server| self.deliver_to_server(broadcaster, server, &info, &message)),
        )
        .await;

        let report = FanOutReport {
            servers: servers.into_iter().zip(outcomes).collect(),
        };
        info!(
            session = %session,
            delivered = report.delivered(),
            failed = report.failed(),
            "Stream start fan-out complete"
        );
        Ok(DispatchOutcome::Announced { session, report })
    }

    async fn deliver_to_server(
        &self,
        broadcaster: &BroadcasterId,
        server: &ServerId,
        info: &StreamInfo,
        message: &RichMessage,
    ) -> ServerOutcome {
        let config = match self.ledgers.server_configs.get(server) {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!(server = %server, "No notification settings");
                return ServerOutcome::Skipped(SkipReason::NotConfigured);
            }
            Err(e) => {
                warn!(server = %server, error = %e, "Failed to load notification settings");
                return ServerOutcome::Failed(e.to_string());
            }
        };

        if config.rules.as_ref().is_some_and(|r| !r.is_empty()) && info.title.trim().is_empty() {
            warn!(server = %server, session = %info.session_id, "Stream title unavailable, cannot apply title rules");
            return ServerOutcome::Skipped(SkipReason::TitleUnavailable);
        }
        if !title_matches(&info.title, config.rules.as_deref()) {
            debug!(server = %server, "Title does not match server rules");
            return ServerOutcome::Skipped(SkipReason::RulesNotMatched);
        }

        let message_id = match self
            .messaging
            .send_rich(&config.channel_id, &message.text, &message.embed)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(server = %server, channel = %config.channel_id, error = %e, "Notification delivery failed");
                return ServerOutcome::Failed(e.to_string());
            }
        };

        let entry = DeliveredNotification {
            broadcaster_id: broadcaster.clone(),
            server_id: server.clone(),
            channel_id: config.channel_id,
            message_id: message_id.clone(),
            session_id: Some(info.session_id.clone()),
            delivered_at: self.clock.now(),
        };
        if let Err(e) = self.ledgers.notifications.record(&entry) {
            // The message is out; it just won't get an end marker.
            warn!(server = %server, message = %message_id, error = %e, "Failed to record delivered notification");
        }

        info!(server = %server, message = %message_id, "Notification delivered");
        ServerOutcome::Delivered(message_id)
    }

    #[instrument(skip(self, event), fields(broadcaster = %broadcaster))]
    async fn on_ended(
        &self,
        broadcaster: &BroadcasterId,
        event: &StreamEvent,
    ) -> Result<DispatchOutcome, DispatchError> {
        let session = match self.provider.stream_info(broadcaster).await {
            Ok(Some(info)) => Some(info.session_id),
            Ok(None) => event.id.clone(),
            Err(e) => {
                warn!(error = %e, "Stream lookup failed on end event");
                event.id.clone()
            }
        };

        let cleared = match &session {
            Some(session) => self.ledgers.active_streams.clear(broadcaster, session).map(|_| 1),
            None => self.ledgers.active_streams.clear_broadcaster(broadcaster),
        };
        if let Err(e) = cleared {
            warn!(error = %e, "Failed to clear active stream mark");
        }

        // Servers that unsubscribed mid-stream still hold an entry to mark.
        let mut servers = self.ledgers.subscriptions.servers_for(broadcaster)?;
        match self.ledgers.notifications.list_for(broadcaster) {
            Ok(entries) => {
                for entry in entries {
                    if !servers.contains(&entry.server_id) {
                        servers.push(entry.server_id);
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to scan delivered notifications"),
        }

        let outcomes = join_all(
            servers
                .iter()
                .map(|server| self.mark_server(broadcaster, server)),
        )
        .await;

        let report = FanOutReport {
            servers: servers.into_iter().zip(outcomes).collect(),
        };
        info!(
            marked = report.marked(),
            failed = report.failed(),
            "Stream end handling complete"
        );
        Ok(DispatchOutcome::Ended { report })
    }

    async fn mark_server(&self, broadcaster: &BroadcasterId, server: &ServerId) -> ServerOutcome {
        let entry = match self.ledgers.notifications.get(broadcaster, server) {
            Ok(Some(entry)) => entry,
            Ok(None) => return ServerOutcome::Skipped(SkipReason::NothingToMark),
            Err(e) => {
                warn!(server = %server, error = %e, "Failed to load delivered notification");
                return ServerOutcome::Failed(e.to_string());
            }
        };

        if let Err(e) = self
            .messaging
            .add_marker(&entry.channel_id, &entry.message_id, &self.config.end_marker)
            .await
        {
            // Keep the entry so a later end event can try again.
            warn!(server = %server, message = %entry.message_id, error = %e, "Failed to add end marker");
            return ServerOutcome::Failed(e.to_string());
        }

        if let Err(e) = self.ledgers.notifications.remove(broadcaster, server) {
            warn!(server = %server, error = %e, "Failed to remove delivered notification");
        }
        ServerOutcome::Marked(entry.message_id)
    }

    fn spawn_cross_post(&self, broadcaster: &BroadcasterId, info: &StreamInfo) {
        let (Some(cross), Some(social)) = (&self.config.cross_post, &self.social) else {
            return;
        };
        if &cross.target != broadcaster {
            return;
        }
        if info.title.trim().is_empty() {
            warn!(session = %info.session_id, "Stream title unavailable, skipping cross-post");
            return;
        }

        let text = cross_post_text(info, &cross.prefix);
        let ledger = self.ledgers.cross_posts.clone();
        let social = social.clone();
        let session = info.session_id.clone();
        tokio::spawn(async move {
            cross_post(&ledger, social.as_ref(), &session, &text).await;
        });
    }
}

/// Posts `text` once per session. Logs, never fails.
pub(crate) async fn cross_post<S: SocialGateway>(
    ledger: &CrossPostLedger,
    social: &S,
    session: &SessionId,
    text: &str,
) {
    match ledger.claim(session) {
        Ok(true) => {}
        Ok(false) => {
            debug!(session = %session, "Session already cross-posted");
            return;
        }
        Err(e) => {
            warn!(session = %session, error = %e, "Cross-post claim failed");
            return;
        }
    }

    if let Err(e) = social.post(text).await {
        warn!(session = %session, error = %e, "Cross-post failed");
        if let Err(e) = ledger.release(session) {
            warn!(session = %session, error = %e, "Failed to release cross-post claim");
        }
    }
}
