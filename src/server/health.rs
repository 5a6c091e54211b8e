//! Liveness probe.

use axum::http::StatusCode;

/// `GET /health`: 200 with `OK` while the process is serving requests.
///
/// Touches neither the store nor any upstream API.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
