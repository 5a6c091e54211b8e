//! Inbound EventSub deliveries.
//!
//! This module provides:
//! - Signature computation and verification (HMAC-SHA256 over id, timestamp, body)
//! - Typed envelope and event payloads
//! - A header-plus-body parser producing [`InboundWebhook`]
//! - [`WebhookVerifier`], which resolves the signing secret per broadcaster

pub mod events;
pub mod parser;
pub mod signature;
pub mod verifier;

pub use events::{Condition, EventKind, MessageType, StreamEvent, SubscriptionDescriptor};
pub use parser::{
    InboundWebhook, MESSAGE_ID_HEADER, MESSAGE_SIGNATURE_HEADER, MESSAGE_TIMESTAMP_HEADER,
    MESSAGE_TYPE_HEADER, NotificationEvent, ParseError, SignedDelivery, WebhookHeaders,
    parse_webhook,
};
pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, signing_input,
    verify_signature,
};
pub use verifier::WebhookVerifier;
