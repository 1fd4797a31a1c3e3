//! Store and push-channel configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use crate::error::{NotifyError, Result};
use crate::transport::ReconnectPolicy;
use crate::types::NotificationKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "notifications";

/// Default push endpoint (the websocket path is appended per user).
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000";

/// Which accepted kinds are published to listeners.
///
/// Kinds outside the policy are still stored and persisted, and can still be
/// re-emitted with `restore`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BroadcastSetting", into = "BroadcastSetting")]
pub enum BroadcastPolicy {
    All,
    Only(BTreeSet<NotificationKind>),
}

impl BroadcastPolicy {
    pub fn is_broadcast(&self, kind: &NotificationKind) -> bool {
        match self {
            BroadcastPolicy::All => true,
            BroadcastPolicy::Only(kinds) => kinds.contains(kind),
        }
    }
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        BroadcastPolicy::Only(
            [
                NotificationKind::DiaryAvailable,
                NotificationKind::DiaryUnavailable,
                NotificationKind::EncourageAvailable,
                NotificationKind::EncourageUnavailable,
                NotificationKind::DiaryReset,
            ]
            .into_iter()
            .collect(),
        )
    }
}

/// On-disk form: either the word `"all"` or a list of kinds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum BroadcastSetting {
    Keyword(String),
    Kinds(Vec<NotificationKind>),
}

impl TryFrom<BroadcastSetting> for BroadcastPolicy {
    type Error = String;

    fn try_from(setting: BroadcastSetting) -> std::result::Result<Self, Self::Error> {
        match setting {
            BroadcastSetting::Keyword(word) if word == "all" => Ok(BroadcastPolicy::All),
            BroadcastSetting::Keyword(word) => Err(format!(
                "broadcast must be \"all\" or a list of kinds, got {word:?}"
            )),
            BroadcastSetting::Kinds(kinds) => Ok(BroadcastPolicy::Only(kinds.into_iter().collect())),
        }
    }
}

impl From<BroadcastPolicy> for BroadcastSetting {
    fn from(policy: BroadcastPolicy) -> Self {
        match policy {
            BroadcastPolicy::All => BroadcastSetting::Keyword("all".to_string()),
            BroadcastPolicy::Only(kinds) => BroadcastSetting::Kinds(kinds.into_iter().collect()),
        }
    }
}

/// Store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Key the whole mapping is persisted under.
    pub storage_key: String,

    /// Kinds published on acceptance.
    pub broadcast: BroadcastPolicy,

    /// Accepting the key kind also clears the listed kinds.
    pub reset_rules: BTreeMap<NotificationKind, Vec<NotificationKind>>,

    /// Buffer size for channel subscriptions created through the store.
    pub subscriber_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let mut reset_rules = BTreeMap::new();
        reset_rules.insert(
            NotificationKind::DiaryReset,
            vec![NotificationKind::DiaryUnavailable],
        );

        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            broadcast: BroadcastPolicy::default(),
            reset_rules,
            subscriber_buffer: 256,
        }
    }
}

/// Push channel configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Base websocket URL; `/ws/{user_id}` is appended.
    pub endpoint: String,

    /// Retry behavior after abnormal disconnects.
    pub reconnect: ReconnectPolicy,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl PushConfig {
    /// Connection URL for a user.
    pub fn url_for(&self, user_id: &str) -> String {
        format!("{}/ws/{}", self.endpoint.trim_end_matches('/'), user_id)
    }
}

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub push: PushConfig,
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        tracing::info!(path = %path.display(), "loading configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.store.storage_key.is_empty() {
            return Err(NotifyError::Config("storage_key must not be empty".into()));
        }
        if !self.push.endpoint.starts_with("ws://") && !self.push.endpoint.starts_with("wss://") {
            return Err(NotifyError::Config(format!(
                "endpoint must be a ws:// or wss:// URL, got {:?}",
                self.push.endpoint
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.push.reconnect.max_attempts, 10);
        assert_eq!(config.push.reconnect.delay_ms, 3000);
    }

    #[test]
    fn test_parse_full_document() {
        let config = Config::from_toml_str(
            r#"
            [store]
            storage_key = "journal"
            broadcast = ["diary_available", "plant_generation"]
            subscriber_buffer = 8

            [store.reset_rules]
            diary_reset = ["diary_unavailable", "diary_available"]

            [push]
            endpoint = "wss://journal.example/"

            [push.reconnect]
            delay_ms = 500
            max_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.store.storage_key, "journal");
        assert!(config
            .store
            .broadcast
            .is_broadcast(&NotificationKind::PlantGeneration));
        assert!(!config
            .store
            .broadcast
            .is_broadcast(&NotificationKind::DiaryUnavailable));
        assert_eq!(
            config.store.reset_rules[&NotificationKind::DiaryReset].len(),
            2
        );
        assert_eq!(config.push.url_for("7"), "wss://journal.example/ws/7");
        assert_eq!(config.push.reconnect.max_attempts, 2);
    }

    #[test]
    fn test_broadcast_all_keyword() {
        let config = Config::from_toml_str("[store]\nbroadcast = \"all\"\n").unwrap();
        assert_eq!(config.store.broadcast, BroadcastPolicy::All);

        let bad = Config::from_toml_str("[store]\nbroadcast = \"some\"\n");
        assert!(matches!(bad, Err(NotifyError::Config(_))));
    }

    #[test]
    fn test_rejects_non_websocket_endpoint() {
        let result = Config::from_toml_str("[push]\nendpoint = \"http://localhost\"\n");
        assert!(matches!(result, Err(NotifyError::Config(_))));
    }
}
