//! Authenticity check for signed deliveries.

use tracing::{debug, warn};

use super::parser::SignedDelivery;
use super::signature::verify_signature;
use crate::ledger::SecretStore;
use crate::types::BroadcasterId;

/// Checks deliveries against the per-broadcaster signing secret.
///
/// Fails closed: an unknown broadcaster, a storage fault or a malformed
/// signature all yield `false`. Nothing here returns an error.
#[derive(Clone)]
pub struct WebhookVerifier {
    secrets: SecretStore,
}

impl WebhookVerifier {
    pub fn new(secrets: SecretStore) -> Self {
        WebhookVerifier { secrets }
    }

    pub fn verify(&self, broadcaster: &BroadcasterId, delivery: &SignedDelivery, body: &[u8]) -> bool {
        let secret = match self.secrets.get(broadcaster) {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                debug!(broadcaster = %broadcaster, "No signing secret for broadcaster");
                return false;
            }
            Err(e) => {
                warn!(broadcaster = %broadcaster, error = %e, "Signing secret lookup failed");
                return false;
            }
        };

        verify_signature(
            &delivery.message_id,
            &delivery.timestamp,
            body,
            &delivery.signature,
            secret.as_bytes(),
        )
    }
}
