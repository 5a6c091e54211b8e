//! EventSub delivery parser.
//!
//! A delivery is parsed exactly once, at the edge, into an [`InboundWebhook`].
//! Everything downstream (verification, dispatch, error reporting) works on
//! that value and the raw body bytes; nothing re-reads the request.
//!
//! # Headers
//!
//! - `Twitch-Eventsub-Message-Type` - `webhook_callback_verification`,
//!   `notification` or `revocation`
//! - `Twitch-Eventsub-Message-Id` - unique delivery id (signed)
//! - `Twitch-Eventsub-Message-Timestamp` - delivery time (signed)
//! - `Twitch-Eventsub-Message-Signature` - `sha256=<hex>`
//!
//! Verification handshakes need only the type header. Notifications and
//! revocations need all four, since they are rejected unsigned.

use thiserror::Error;

use super::events::{EventKind, Envelope, MessageType, StreamEvent, SubscriptionDescriptor};
use crate::types::BroadcasterId;

pub const MESSAGE_TYPE_HEADER: &str = "Twitch-Eventsub-Message-Type";
pub const MESSAGE_ID_HEADER: &str = "Twitch-Eventsub-Message-Id";
pub const MESSAGE_TIMESTAMP_HEADER: &str = "Twitch-Eventsub-Message-Timestamp";
pub const MESSAGE_SIGNATURE_HEADER: &str = "Twitch-Eventsub-Message-Signature";

/// Error type for delivery parsing failures. All map to 400.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// Header values as received. Absent headers are `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookHeaders<'a> {
    pub message_type: Option<&'a str>,
    pub message_id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
}

/// The signed headers of a notification or revocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDelivery {
    pub message_id: String,
    pub timestamp: String,
    pub signature: String,
}

/// The event carried by a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    StreamOnline(StreamEvent),
    StreamOffline(StreamEvent),
    /// A subscription type the relay does not handle.
    Unsupported(String),
}

/// A parsed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundWebhook {
    Challenge {
        challenge: String,
        subscription: SubscriptionDescriptor,
    },
    Notification {
        delivery: SignedDelivery,
        subscription: SubscriptionDescriptor,
        broadcaster: BroadcasterId,
        event: NotificationEvent,
    },
    Revocation {
        delivery: SignedDelivery,
        subscription: SubscriptionDescriptor,
        broadcaster: BroadcasterId,
    },
}

impl InboundWebhook {
    pub fn message_type(&self) -> MessageType {
        match self {
            InboundWebhook::Challenge { .. } => MessageType::Verification,
            InboundWebhook::Notification { .. } => MessageType::Notification,
            InboundWebhook::Revocation { .. } => MessageType::Revocation,
        }
    }

    pub fn subscription(&self) -> &SubscriptionDescriptor {
        match self {
            InboundWebhook::Challenge { subscription, .. }
            | InboundWebhook::Notification { subscription, .. }
            | InboundWebhook::Revocation { subscription, .. } => subscription,
        }
    }
}

/// Parses a delivery from its headers and raw body.
///
/// # Examples
///
/// ```
/// use live_relay::webhooks::{parse_webhook, InboundWebhook, WebhookHeaders};
///
/// let body = br#"{
///     "challenge": "pogchamp-kappa-360noscope-vohiyo",
///     "subscription": {
///         "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
///         "type": "stream.online",
///         "version": "1",
///         "status": "webhook_callback_verification_pending",
///         "condition": { "broadcaster_user_id": "12826" }
///     }
/// }"#;
/// let headers = WebhookHeaders {
///     message_type: Some("webhook_callback_verification"),
///     ..Default::default()
/// };
///
/// let parsed = parse_webhook(&headers, body).unwrap();
/// assert!(matches!(parsed, InboundWebhook::Challenge { .. }));
/// ```
pub fn parse_webhook(headers: &WebhookHeaders<'_>, body: &[u8]) -> Result<InboundWebhook, ParseError> {
    let raw_type = headers
        .message_type
        .ok_or(ParseError::MissingHeader(MESSAGE_TYPE_HEADER))?;
    let message_type = MessageType::from_header(raw_type)
        .ok_or_else(|| ParseError::UnknownMessageType(raw_type.to_string()))?;

    let envelope: Envelope = serde_json::from_slice(body)?;

    if message_type == MessageType::Verification {
        let challenge = envelope
            .challenge
            .ok_or(ParseError::MissingField("challenge"))?;
        return Ok(InboundWebhook::Challenge {
            challenge,
            subscription: envelope.subscription,
        });
    }

    let delivery = signed_delivery(headers)?;
    let broadcaster = envelope
        .subscription
        .condition
        .broadcaster_user_id
        .clone()
        .ok_or(ParseError::MissingField("subscription.condition.broadcaster_user_id"))?;

    if message_type == MessageType::Revocation {
        return Ok(InboundWebhook::Revocation {
            delivery,
            subscription: envelope.subscription,
            broadcaster,
        });
    }

    let event = match &envelope.subscription.kind {
        EventKind::StreamOnline | EventKind::StreamOffline => {
            let raw = envelope.event.ok_or(ParseError::MissingField("event"))?;
            let event: StreamEvent = serde_json::from_value(raw)?;
            if envelope.subscription.kind == EventKind::StreamOnline {
                NotificationEvent::StreamOnline(event)
            } else {
                NotificationEvent::StreamOffline(event)
            }
        }
        EventKind::Other(kind) => NotificationEvent::Unsupported(kind.clone()),
    };

    Ok(InboundWebhook::Notification {
        delivery,
        subscription: envelope.subscription,
        broadcaster,
        event,
    })
}

fn signed_delivery(headers: &WebhookHeaders<'_>) -> Result<SignedDelivery, ParseError> {
    Ok(SignedDelivery {
        message_id: headers
            .message_id
            .ok_or(ParseError::MissingHeader(MESSAGE_ID_HEADER))?
            .to_string(),
        timestamp: headers
            .timestamp
            .ok_or(ParseError::MissingHeader(MESSAGE_TIMESTAMP_HEADER))?
            .to_string(),
        signature: headers
            .signature
            .ok_or(ParseError::MissingHeader(MESSAGE_SIGNATURE_HEADER))?
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;

    fn signed(message_type: &'static str) -> WebhookHeaders<'static> {
        WebhookHeaders {
            message_type: Some(message_type),
            message_id: Some("m1"),
            timestamp: Some("2024-01-01T00:00:00Z"),
            signature: Some("sha256=00"),
        }
    }

    fn online_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "subscription": {
                "id": "sub-1",
                "type": "stream.online",
                "version": "1",
                "status": "enabled",
                "condition": { "broadcaster_user_id": "1337" },
                "transport": { "method": "webhook", "callback": "https://example.com" },
                "created_at": "2019-11-16T10:11:12.634234626Z"
            },
            "event": {
                "id": "9001",
                "broadcaster_user_id": "1337",
                "broadcaster_user_login": "cool_user",
                "broadcaster_user_name": "Cool_User",
                "type": "live",
                "started_at": "2020-10-11T10:11:12.123Z"
            }
        }))
        .unwrap()
    }

    #[test]
    fn challenge_needs_no_signature_headers() {
        let body = br#"{"challenge":"abc","subscription":{"id":"s","type":"stream.online","condition":{}}}"#;
        let headers = WebhookHeaders {
            message_type: Some("webhook_callback_verification"),
            ..Default::default()
        };

        match parse_webhook(&headers, body).unwrap() {
            InboundWebhook::Challenge { challenge, .. } => assert_eq!(challenge, "abc"),
            other => panic!("expected challenge, got {other:?}"),
        }
    }

    #[test]
    fn challenge_without_token_is_rejected() {
        let body = br#"{"subscription":{"id":"s","type":"stream.online","condition":{}}}"#;
        let headers = WebhookHeaders {
            message_type: Some("webhook_callback_verification"),
            ..Default::default()
        };
        assert!(matches!(
            parse_webhook(&headers, body),
            Err(ParseError::MissingField("challenge"))
        ));
    }

    #[test]
    fn online_notification_parses() {
        let parsed = parse_webhook(&signed("notification"), &online_body()).unwrap();

        let InboundWebhook::Notification {
            delivery,
            broadcaster,
            event,
            ..
        } = parsed
        else {
            panic!("expected notification");
        };
        assert_eq!(delivery.message_id, "m1");
        assert_eq!(broadcaster, BroadcasterId::new("1337"));
        let NotificationEvent::StreamOnline(event) = event else {
            panic!("expected stream.online");
        };
        assert_eq!(event.id, Some(SessionId::new("9001")));
        assert_eq!(event.broadcaster_user_login, "cool_user");
    }

    #[test]
    fn offline_notification_parses() {
        let body = serde_json::to_vec(&serde_json::json!({
            "subscription": {
                "id": "sub-2",
                "type": "stream.offline",
                "condition": { "broadcaster_user_id": "1337" }
            },
            "event": {
                "broadcaster_user_id": "1337",
                "broadcaster_user_login": "cool_user",
                "broadcaster_user_name": "Cool_User"
            }
        }))
        .unwrap();

        let parsed = parse_webhook(&signed("notification"), &body).unwrap();
        assert!(matches!(
            parsed,
            InboundWebhook::Notification {
                event: NotificationEvent::StreamOffline(_),
                ..
            }
        ));
    }

    #[test]
    fn unsupported_subscription_type_is_not_an_error() {
        let body = br#"{"subscription":{"id":"s","type":"channel.follow","condition":{"broadcaster_user_id":"1"}},"event":{"whatever":true}}"#;
        let parsed = parse_webhook(&signed("notification"), body).unwrap();
        assert!(matches!(
            parsed,
            InboundWebhook::Notification {
                event: NotificationEvent::Unsupported(ref k),
                ..
            } if k == "channel.follow"
        ));
    }

    #[test]
    fn revocation_parses() {
        let body = br#"{"subscription":{"id":"s","type":"stream.online","status":"authorization_revoked","condition":{"broadcaster_user_id":"1"}}}"#;
        let parsed = parse_webhook(&signed("revocation"), body).unwrap();
        assert_eq!(parsed.message_type(), MessageType::Revocation);
        assert_eq!(parsed.subscription().status.as_deref(), Some("authorization_revoked"));
    }

    #[test]
    fn missing_signature_header_is_rejected() {
        let headers = WebhookHeaders {
            signature: None,
            ..signed("notification")
        };
        assert!(matches!(
            parse_webhook(&headers, &online_body()),
            Err(ParseError::MissingHeader(MESSAGE_SIGNATURE_HEADER))
        ));
    }

    #[test]
    fn missing_type_header_is_rejected() {
        assert!(matches!(
            parse_webhook(&WebhookHeaders::default(), &online_body()),
            Err(ParseError::MissingHeader(MESSAGE_TYPE_HEADER))
        ));
    }

    #[test]
    fn unknown_type_header_is_rejected() {
        assert!(matches!(
            parse_webhook(&signed("bogus"), &online_body()),
            Err(ParseError::UnknownMessageType(_))
        ));
    }

    #[test]
    fn missing_broadcaster_condition_is_rejected() {
        let body = br#"{"subscription":{"id":"s","type":"stream.online","condition":{}},"event":{}}"#;
        assert!(matches!(
            parse_webhook(&signed("notification"), body),
            Err(ParseError::MissingField(_))
        ));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            parse_webhook(&signed("notification"), b"not json"),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn online_without_event_is_rejected() {
        let body = br#"{"subscription":{"id":"s","type":"stream.online","condition":{"broadcaster_user_id":"1"}}}"#;
        assert!(matches!(
            parse_webhook(&signed("notification"), body),
            Err(ParseError::MissingField("event"))
        ));
    }
}
