//! Per-broadcaster webhook signing secrets.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MAX_CAS_ATTEMPTS;
use crate::store::{Key, KvStore, Result, StoreError};
use crate::types::BroadcasterId;

const NAMESPACE: &str = "signing_secret";

/// A shared secret used to authenticate provider webhooks.
///
/// `Debug` is redacted so secrets never reach the logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningSecret(String);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        SigningSecret(secret.into())
    }

    /// A fresh secret: 32 random bytes, hex encoded.
    pub fn generate() -> Self {
        SigningSecret(hex::encode(rand::random::<[u8; 32]>()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

#[derive(Clone)]
pub struct SecretStore {
    store: Arc<dyn KvStore>,
}

impl SecretStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        SecretStore { store }
    }

    fn key(broadcaster: &BroadcasterId) -> Key {
        Key::new([NAMESPACE, broadcaster.as_str()])
    }

    pub fn put(&self, broadcaster: &BroadcasterId, secret: &SigningSecret) -> Result<()> {
        self.store
            .set(Self::key(broadcaster), &serde_json::to_value(secret)?)?;
        Ok(())
    }

    pub fn get(&self, broadcaster: &BroadcasterId) -> Result<Option<SigningSecret>> {
        self.store
            .get(&Self::key(broadcaster))?
            .map(|v| v.decode())
            .transpose()
    }

    pub fn remove(&self, broadcaster: &BroadcasterId) -> Result<()> {
        self.store.delete(Self::key(broadcaster))
    }

    /// Returns the existing secret, or creates one.
    ///
    /// Creation goes through set-if-absent, so concurrent registrations of
    /// the same broadcaster all end up with the secret that won.
    pub fn get_or_create(&self, broadcaster: &BroadcasterId) -> Result<SigningSecret> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            if let Some(existing) = self.get(broadcaster)? {
                return Ok(existing);
            }

            let fresh = SigningSecret::generate();
            let created = self.store.set_if_absent(
                Self::key(broadcaster),
                &serde_json::to_value(&fresh)?,
                None,
            )?;
            if created {
                debug!(broadcaster = %broadcaster, "Created signing secret");
                return Ok(fresh);
            }
        }

        Err(StoreError::Contention(Self::key(broadcaster)))
    }
}
