//! Slash-command endpoint.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use super::webhook::get_header;
use crate::commands::{
    Interaction, InteractionResponse, SIGNATURE_HEADER, TIMESTAMP_HEADER, verify_interaction,
};
use crate::gateways::Gateways;

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid request signature")]
    InvalidSignature,

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl IntoResponse for InteractionError {
    fn into_response(self) -> Response {
        let status = match &self {
            InteractionError::MissingHeader(_) | InteractionError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            InteractionError::InvalidJson(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Interaction handler.
///
/// The signature is checked before the body is parsed.
pub async fn interactions_handler<G: Gateways>(
    State(app_state): State<AppState<G>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InteractionResponse>, InteractionError> {
    let signature = get_header(&headers, SIGNATURE_HEADER)
        .ok_or(InteractionError::MissingHeader(SIGNATURE_HEADER))?;
    let timestamp = get_header(&headers, TIMESTAMP_HEADER)
        .ok_or(InteractionError::MissingHeader(TIMESTAMP_HEADER))?;

    if !verify_interaction(app_state.interaction_key(), signature, timestamp, &body) {
        warn!("Invalid interaction signature");
        return Err(InteractionError::InvalidSignature);
    }

    let interaction: Interaction = serde_json::from_slice(&body)?;
    debug!(
        kind = interaction.kind,
        server = interaction.guild_id.as_ref().map(|g| g.as_str()).unwrap_or("-"),
        "Received interaction"
    );

    Ok(Json(app_state.commands().handle(&interaction).await))
}
