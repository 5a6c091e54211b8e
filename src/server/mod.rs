//! HTTP surface.
//!
//! # Endpoints
//!
//! - `POST /twitch/webhooks` - EventSub deliveries (challenge, notification, revocation)
//! - `POST /discord/interactions` - slash commands, Ed25519-authenticated
//! - `GET /health` - returns 200 if the server is running
//! - `GET /api/v1/debug/kv` - dumps every live store entry (admin token)
//! - `DELETE /api/v1/debug/kv` - clears the store atomically (admin token)
//! - `DELETE /api/v1/debug/kv/entry` - deletes the entry named by `{"key": [...]}` (admin token)

use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use tower_http::trace::TraceLayer;

use crate::commands::CommandExecutor;
use crate::gateways::Gateways;
use crate::notify::Dispatcher;
use crate::store::KvStore;

pub mod admin;
pub mod health;
pub mod interactions;
pub mod webhook;

pub use admin::{AdminError, clear_handler, delete_entry_handler, dump_handler};
pub use health::health_handler;
pub use interactions::{InteractionError, interactions_handler};
pub use webhook::{WebhookError, webhook_handler};

pub const WEBHOOK_PATH: &str = "/twitch/webhooks";
pub const INTERACTIONS_PATH: &str = "/discord/interactions";
pub const DEBUG_KV_PATH: &str = "/api/v1/debug/kv";
pub const DEBUG_KV_ENTRY_PATH: &str = "/api/v1/debug/kv/entry";

/// Shared application state, passed to handlers via axum's `State` extractor.
pub struct AppState<G: Gateways> {
    inner: Arc<AppStateInner<G>>,
}

struct AppStateInner<G: Gateways> {
    dispatcher: Dispatcher<G>,
    commands: CommandExecutor<G::Provider>,
    store: Arc<dyn KvStore>,
    /// Verifies interaction signatures.
    interaction_key: VerifyingKey,
    /// `None` disables the debug endpoints.
    admin_token: Option<String>,
}

impl<G: Gateways> Clone for AppState<G> {
    fn clone(&self) -> Self {
        AppState {
            inner: self.inner.clone(),
        }
    }
}

impl<G: Gateways> AppState<G> {
    pub fn new(
        dispatcher: Dispatcher<G>,
        commands: CommandExecutor<G::Provider>,
        store: Arc<dyn KvStore>,
        interaction_key: VerifyingKey,
        admin_token: Option<String>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                dispatcher,
                commands,
                store,
                interaction_key,
                admin_token: admin_token.filter(|t| !t.is_empty()),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<G> {
        &self.inner.dispatcher
    }

    pub fn commands(&self) -> &CommandExecutor<G::Provider> {
        &self.inner.commands
    }

    pub fn store(&self) -> &dyn KvStore {
        self.inner.store.as_ref()
    }

    pub fn interaction_key(&self) -> &VerifyingKey {
        &self.inner.interaction_key
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.inner.admin_token.as_deref()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<G: Gateways>(app_state: AppState<G>) -> axum::Router {
    use axum::routing::{delete, get, post};

    axum::Router::new()
        .route(WEBHOOK_PATH, post(webhook_handler::<G>))
        .route(INTERACTIONS_PATH, post(interactions_handler::<G>))
        .route("/health", get(health_handler))
        .route(
            DEBUG_KV_PATH,
            get(dump_handler::<G>).delete(clear_handler::<G>),
        )
        .route(DEBUG_KV_ENTRY_PATH, delete(delete_entry_handler::<G>))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
