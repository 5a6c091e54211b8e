//! Debug endpoints over the raw store.
//!
//! Dump, clear and single-entry delete. Disabled unless an admin token is
//! configured; every request must carry `Authorization: Bearer <token>`.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::AppState;
use super::webhook::get_header;
use crate::gateways::Gateways;
use crate::store::{Key, StoreError, Versionstamp, clear_prefix};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("admin endpoints are disabled")]
    Disabled,

    #[error("missing or invalid admin token")]
    Unauthorized,

    #[error("invalid request body: key must be a non-empty array of strings")]
    InvalidKey,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::Disabled => StatusCode::FORBIDDEN,
            AdminError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdminError::InvalidKey => StatusCode::BAD_REQUEST,
            AdminError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// One live entry, as shown by the dump endpoint.
#[derive(Debug, Serialize)]
pub struct DumpEntry {
    pub key: Key,
    pub value: serde_json::Value,
    pub versionstamp: Versionstamp,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteEntryResponse {
    pub deleted: Key,
}

fn authorize<G: Gateways>(app_state: &AppState<G>, headers: &HeaderMap) -> Result<(), AdminError> {
    let expected = app_state.admin_token().ok_or(AdminError::Disabled)?;
    let provided = get_header(headers, header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AdminError::Unauthorized)?;

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        warn!("Rejected admin request with wrong token");
        return Err(AdminError::Unauthorized);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `GET /api/v1/debug/kv`: every live entry in key order.
pub async fn dump_handler<G: Gateways>(
    State(app_state): State<AppState<G>>,
    headers: HeaderMap,
) -> Result<Json<Vec<DumpEntry>>, AdminError> {
    authorize(&app_state, &headers)?;

    let entries = app_state
        .store()
        .list(&Key::root())?
        .into_iter()
        .map(|(key, v)| DumpEntry {
            key,
            value: v.value,
            versionstamp: v.versionstamp,
        })
        .collect();
    Ok(Json(entries))
}

/// `DELETE /api/v1/debug/kv`: removes every entry in one transaction.
pub async fn clear_handler<G: Gateways>(
    State(app_state): State<AppState<G>>,
    headers: HeaderMap,
) -> Result<Json<ClearResponse>, AdminError> {
    authorize(&app_state, &headers)?;

    let removed = clear_prefix(app_state.store(), &Key::root())?;
    info!(removed, "Cleared store");
    Ok(Json(ClearResponse { removed }))
}

/// `DELETE /api/v1/debug/kv/entry` with `{"key": [...]}`: removes one entry.
pub async fn delete_entry_handler<G: Gateways>(
    State(app_state): State<AppState<G>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DeleteEntryResponse>, AdminError> {
    authorize(&app_state, &headers)?;

    let key = parse_entry_key(&body)?;
    app_state.store().delete(key.clone())?;
    info!(key = %key, "Deleted store entry");
    Ok(Json(DeleteEntryResponse { deleted: key }))
}

fn parse_entry_key(body: &[u8]) -> Result<Key, AdminError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| AdminError::InvalidKey)?;
    let parts = value
        .get("key")
        .and_then(|k| k.as_array())
        .filter(|parts| !parts.is_empty())
        .ok_or(AdminError::InvalidKey)?;

    parts
        .iter()
        .map(|p| p.as_str().ok_or(AdminError::InvalidKey))
        .collect::<Result<Vec<_>, _>>()
        .map(Key::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_compares_contents() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"token2"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn entry_key_must_be_non_empty_string_array() {
        assert_eq!(
            parse_entry_key(br#"{"key": ["notification", "b1", "g1"]}"#).unwrap(),
            Key::new(["notification", "b1", "g1"])
        );
        for body in [
            &br#"{"key": []}"#[..],
            br#"{"key": "notification"}"#,
            br#"{"key": ["a", 1]}"#,
            br#"{}"#,
            b"not json",
        ] {
            assert!(matches!(parse_entry_key(body), Err(AdminError::InvalidKey)));
        }
    }
}
