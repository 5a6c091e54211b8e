//! Cached provider access token.
//!
//! The token is an explicit component with an injected clock rather than a
//! global. It is in one of three states:
//!
//! - `Absent`: never fetched, or invalidated after a 401
//! - `Valid { until }`: usable until `until`
//! - `Expired`: fetched, but `until` has passed
//!
//! `until` is the provider's stated expiry minus [`REFRESH_MARGIN`], so a
//! token is never used in the last minutes of its life.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::error::GatewayError;
use crate::clock::Clock;

/// Tokens are refreshed this long before the provider says they expire.
pub const REFRESH_MARGIN: Duration = Duration::minutes(10);

/// Observable state of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Absent,
    Valid { until: DateTime<Utc> },
    Expired,
}

/// A token as returned by the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchedToken {
    pub value: String,
    /// Lifetime stated by the provider.
    pub expires_in: Duration,
}

impl std::fmt::Debug for FetchedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedToken")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

struct CachedToken {
    value: String,
    until: DateTime<Utc>,
}

pub struct AccessTokenCache {
    clock: Arc<dyn Clock>,
    // Held across the refresh so concurrent callers wait for one fetch.
    slot: Mutex<Option<CachedToken>>,
}

impl AccessTokenCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        AccessTokenCache {
            clock,
            slot: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> TokenState {
        let slot = self.slot.lock().await;
        Self::state_of(slot.as_ref(), self.clock.now())
    }

    fn state_of(token: Option<&CachedToken>, now: DateTime<Utc>) -> TokenState {
        match token {
            None => TokenState::Absent,
            Some(t) if now < t.until => TokenState::Valid { until: t.until },
            Some(_) => TokenState::Expired,
        }
    }

    /// Forgets the token, e.g. after the provider rejected it.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Returns a valid token, calling `fetch` if there is none.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedToken, GatewayError>>,
    {
        let mut slot = self.slot.lock().await;
        let now = self.clock.now();

        if let Some(token) = slot.as_ref()
            && now < token.until
        {
            return Ok(token.value.clone());
        }

        let fetched = fetch().await?;
        let until = self.clock.now() + fetched.expires_in - REFRESH_MARGIN;
        debug!(%until, "Refreshed access token");

        *slot = Some(CachedToken {
            value: fetched.value.clone(),
            until,
        });
        Ok(fetched.value)
    }
}

impl std::fmt::Debug for AccessTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenCache").finish_non_exhaustive()
    }
}
