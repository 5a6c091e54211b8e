//! Outbound API error types.
//!
//! Every gateway call fails with a [`GatewayError`], categorised for retry
//! decisions:
//!
//! - **Transient** errors are retriable (5xx, 429, timeouts, connection failures)
//! - **Permanent** errors are not (most 4xx, undecodable responses)
//!
//! The dispatcher never retries on its own; it only logs. Retrying happens
//! inside each client via [`retry_with_backoff`](super::retry::retry_with_backoff).

use std::fmt;
use thiserror::Error;

/// The kind of gateway error, categorised for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Safe to retry with backoff.
    Transient,
    /// Retrying will not help.
    Permanent,
}

impl GatewayErrorKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, GatewayErrorKind::Transient)
    }
}

/// An outbound API error with categorisation for retry decisions.
#[derive(Debug, Error)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,

    /// The HTTP status code, if the request got that far.
    pub status_code: Option<u16>,

    pub message: String,

    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "gateway error (HTTP {}): {}", code, self.message),
            None => write!(f, "gateway error: {}", self.message),
        }
    }
}

impl GatewayError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Categorises a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            429 => GatewayErrorKind::Transient,
            code if (500..600).contains(&code) => GatewayErrorKind::Transient,
            _ => GatewayErrorKind::Permanent,
        };

        Self {
            kind,
            status_code: Some(status),
            message: truncate(body, 300),
            source: None,
        }
    }

    /// Categorises a transport-level failure.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let status_code = err.status().map(|s| s.as_u16());
        let kind = if err.is_timeout() || err.is_connect() || err.is_request() {
            GatewayErrorKind::Transient
        } else if let Some(code) = status_code {
            GatewayError::from_status(code, "").kind
        } else {
            GatewayErrorKind::Permanent
        };

        Self {
            kind,
            status_code,
            message: err.to_string(),
            source: Some(err),
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::from_reqwest(err)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
