//! TOML configuration for queue consumers
//!
//! Settings can be built in code, parsed from a TOML string, or loaded from
//! a file. Every field has a default so an empty document is valid:
//!
//! ```toml
//! reconnect-margin-ms = 100
//!
//! [memory-broker]
//! namespace = "rsmq:"
//! notification-marker = "rt:"
//! visibility-timeout-ms = 30000
//! max-message-size = 65536
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default margin added on top of the broker's reconnect backoff
pub const DEFAULT_RECONNECT_MARGIN_MS: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Error reading configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {message}")]
    Invalid { field: String, message: String },
}

impl crate::core::error_handling::ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, ConfigError::Invalid { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ConfigError::Invalid { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Settings shared by every iterator created from a queue definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct StreamSettings {
    /// Fixed delay added to `delay × backoff` before waking after a reconnect attempt
    pub reconnect_margin_ms: u64,
    /// Settings for the in-process broker
    pub memory_broker: MemoryBrokerSettings,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_margin_ms: DEFAULT_RECONNECT_MARGIN_MS,
            memory_broker: MemoryBrokerSettings::default(),
        }
    }
}

/// Settings for [`crate::broker::MemoryBroker`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MemoryBrokerSettings {
    /// Key prefix for queues and notification channels
    pub namespace: String,
    /// Marker between namespace and queue name in notification channel names
    pub notification_marker: String,
    /// How long a received message stays hidden before redelivery
    pub visibility_timeout_ms: u64,
    /// Largest accepted payload in bytes
    pub max_message_size: usize,
}

impl Default for MemoryBrokerSettings {
    fn default() -> Self {
        Self {
            namespace: "rsmq:".to_string(),
            notification_marker: crate::broker::api::DEFAULT_NOTIFICATION_MARKER.to_string(),
            visibility_timeout_ms: 30_000,
            max_message_size: 65_536,
        }
    }
}

impl StreamSettings {
    pub fn reconnect_margin(&self) -> Duration {
        Duration::from_millis(self.reconnect_margin_ms)
    }

    /// Parse and validate settings from a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings: StreamSettings = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
        log::debug!("Loaded queue settings from {}", path.display());
        Self::from_toml_str(&contents)
    }

    /// Check values that deserialize fine but cannot work at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_broker.notification_marker.is_empty() {
            return Err(ConfigError::Invalid {
                field: "memory-broker.notification-marker".to_string(),
                message: "notification marker cannot be empty".to_string(),
            });
        }
        if self.memory_broker.max_message_size == 0 {
            return Err(ConfigError::Invalid {
                field: "memory-broker.max-message-size".to_string(),
                message: "maximum message size must be greater than 0".to_string(),
            });
        }
        if self.memory_broker.visibility_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "memory-broker.visibility-timeout-ms".to_string(),
                message: "visibility timeout must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
