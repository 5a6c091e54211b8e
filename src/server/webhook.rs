//! Provider webhook endpoint.
//!
//! The body is parsed exactly once; the parsed delivery and the raw bytes
//! (for the signature check) are handed to the dispatcher together.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use crate::gateways::Gateways;
use crate::notify::{DispatchError, DispatchOutcome};
use crate::webhooks::{
    MESSAGE_ID_HEADER, MESSAGE_SIGNATURE_HEADER, MESSAGE_TIMESTAMP_HEADER, MESSAGE_TYPE_HEADER,
    ParseError, WebhookHeaders, parse_webhook,
};

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing header, bad JSON or a missing required field.
    #[error("invalid webhook: {0}")]
    Invalid(#[from] ParseError),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("internal error")]
    Internal(String),
}

impl From<DispatchError> for WebhookError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Unauthenticated => WebhookError::InvalidSignature,
            DispatchError::Storage(e) => WebhookError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::Invalid(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 200 with the challenge as `text/plain`: verification handshake
/// - 200 with `{"status": "ok", "outcome": ...}`: notification or revocation handled
/// - 400: missing header or malformed payload
/// - 401: signature did not verify
/// - 500: a ledger the delivery depends on was unavailable
pub async fn webhook_handler<G: Gateways>(
    State(app_state): State<AppState<G>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let webhook_headers = WebhookHeaders {
        message_type: get_header(&headers, MESSAGE_TYPE_HEADER),
        message_id: get_header(&headers, MESSAGE_ID_HEADER),
        timestamp: get_header(&headers, MESSAGE_TIMESTAMP_HEADER),
        signature: get_header(&headers, MESSAGE_SIGNATURE_HEADER),
    };

    let webhook = parse_webhook(&webhook_headers, &body).inspect_err(|e| {
        warn!(error = %e, "Rejecting malformed webhook");
    })?;
    debug!(
        message_id = webhook_headers.message_id.unwrap_or("-"),
        message_type = ?webhook.message_type(),
        "Received webhook"
    );

    let outcome = app_state
        .dispatcher()
        .handle(&webhook, &body)
        .await
        .inspect_err(|e| warn!(error = %e, "Webhook dispatch failed"))?;

    Ok(match outcome {
        DispatchOutcome::Challenge(challenge) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            challenge,
        )
            .into_response(),
        other => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "outcome": outcome_label(&other) })),
        )
            .into_response(),
    })
}

fn outcome_label(outcome: &DispatchOutcome) -> &'static str {
    match outcome {
        DispatchOutcome::Challenge(_) => "challenge",
        DispatchOutcome::Announced { .. } => "announced",
        DispatchOutcome::AlreadyAnnounced { .. } => "already_announced",
        DispatchOutcome::NoSession => "no_session",
        DispatchOutcome::Ended { .. } => "ended",
        DispatchOutcome::Revoked => "revoked",
        DispatchOutcome::Ignored { .. } => "ignored",
    }
}

/// Reads a header as UTF-8; non-UTF-8 values count as missing.
pub(crate) fn get_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn get_header_present() {
        let mut headers = HeaderMap::new();
        headers.insert("twitch-eventsub-message-type", "notification".parse().unwrap());

        assert_eq!(
            get_header(&headers, MESSAGE_TYPE_HEADER),
            Some("notification")
        );
    }

    #[test]
    fn get_header_missing() {
        assert_eq!(get_header(&HeaderMap::new(), MESSAGE_TYPE_HEADER), None);
    }

    #[test]
    fn error_status_codes() {
        let cases = [
            (
                WebhookError::Invalid(ParseError::MissingHeader(MESSAGE_ID_HEADER)),
                StatusCode::BAD_REQUEST,
            ),
            (WebhookError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (
                WebhookError::from(DispatchError::Storage(StoreError::Poisoned)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let e = WebhookError::from(DispatchError::Storage(StoreError::Poisoned));
        assert_eq!(e.to_string(), "internal error");
    }
}
