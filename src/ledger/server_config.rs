//! Per-server delivery target and title rules.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::{Key, KvStore, Result};
use crate::types::{ChannelId, ServerId};

const NAMESPACE: &str = "server_config";

/// Where a server wants notifications, and which titles it cares about.
///
/// `rules: None` means every stream is delivered. An empty list is
/// normalised to `None` on construction so the two never diverge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<String>>,
}

impl NotifyConfig {
    pub fn new(channel_id: ChannelId, rules: Vec<String>) -> Self {
        NotifyConfig {
            channel_id,
            rules: (!rules.is_empty()).then_some(rules),
        }
    }

    /// Delivers everything to `channel_id`.
    pub fn unfiltered(channel_id: ChannelId) -> Self {
        Self::new(channel_id, Vec::new())
    }
}

#[derive(Clone)]
pub struct ServerConfigStore {
    store: Arc<dyn KvStore>,
}

impl ServerConfigStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        ServerConfigStore { store }
    }

    fn key(server: &ServerId) -> Key {
        Key::new([NAMESPACE, server.as_str()])
    }

    /// Replaces the server's config wholesale.
    pub fn set(&self, server: &ServerId, config: &NotifyConfig) -> Result<()> {
        self.store
            .set(Self::key(server), &serde_json::to_value(config)?)?;
        Ok(())
    }

    /// `None` means no delivery target is configured, which is not an error.
    pub fn get(&self, server: &ServerId) -> Result<Option<NotifyConfig>> {
        self.store
            .get(&Self::key(server))?
            .map(|v| v.decode())
            .transpose()
    }

    pub fn delete(&self, server: &ServerId) -> Result<()> {
        self.store.delete(Self::key(server))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn configs() -> ServerConfigStore {
        ServerConfigStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn empty_rules_mean_no_filtering() {
        let c = NotifyConfig::new(ChannelId::new("c1"), vec![]);
        assert_eq!(c.rules, None);
    }

    #[test]
    fn set_overwrites_rather_than_merges() {
        let configs = configs();
        let g = ServerId::new("g1");

        configs
            .set(
                &g,
                &NotifyConfig::new(ChannelId::new("c1"), vec!["gameA".into()]),
            )
            .unwrap();
        configs
            .set(&g, &NotifyConfig::unfiltered(ChannelId::new("c2")))
            .unwrap();

        let got = configs.get(&g).unwrap().unwrap();
        assert_eq!(got.channel_id, ChannelId::new("c2"));
        assert_eq!(got.rules, None);
    }

    #[test]
    fn missing_config_is_none() {
        assert!(configs().get(&ServerId::new("g1")).unwrap().is_none());
    }

    #[test]
    fn delete_removes() {
        let configs = configs();
        let g = ServerId::new("g1");
        configs
            .set(&g, &NotifyConfig::unfiltered(ChannelId::new("c1")))
            .unwrap();
        configs.delete(&g).unwrap();
        assert!(configs.get(&g).unwrap().is_none());
    }

    #[test]
    fn stored_shape_is_stable() {
        let c = NotifyConfig::new(ChannelId::new("c1"), vec!["a".into(), "b".into()]);
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            serde_json::json!({"channel_id": "c1", "rules": ["a", "b"]})
        );
        assert_eq!(
            serde_json::to_value(NotifyConfig::unfiltered(ChannelId::new("c1"))).unwrap(),
            serde_json::json!({"channel_id": "c1"})
        );
    }
}
