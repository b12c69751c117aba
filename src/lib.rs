//! GR2 Client
//!
//! Resilient client SDK for the Golden Retriever 2.0 backend with:
//! - Retrying HTTP request client with exponential backoff and error classification
//! - Reconnecting WebSocket connection manager for live price/chat frames
//! - Chat transport selection (persistent channel with HTTP fallback)
//! - Session state tracking an ordered message log and aggregate status

pub mod backend;
pub mod channel;
pub mod chat;
pub mod http;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub backend: BackendYamlConfig,
    pub channel: ChannelYamlConfig,
    pub retry: RetryYamlConfig,
    pub chat: ChatYamlConfig,
}

/// Backend HTTP configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendYamlConfig {
    pub base_url: String,
}

impl Default for BackendYamlConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
        }
    }
}

/// Persistent channel configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelYamlConfig {
    pub url: String,
    pub max_reconnect_attempts: u32,
    pub base_interval_ms: u64,
    pub max_interval_ms: u64,
    pub jitter_ms: u64,
}

impl Default for ChannelYamlConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".into(),
            max_reconnect_attempts: 5,
            base_interval_ms: 1000,
            max_interval_ms: 30_000,
            jitter_ms: 1000,
        }
    }
}

/// HTTP retry budget section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryYamlConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryYamlConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter_ms: 250,
        }
    }
}

/// Chat behavior section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatYamlConfig {
    /// Route chat over the persistent channel when connected.
    /// `false` gives the HTTP-only behavior.
    pub prefer_persistent_channel: bool,
    /// Send chat as legacy `chat:<message>` text frames instead of JSON commands
    pub legacy_text_frames: bool,
    /// How long to wait for a channel answer before falling back to HTTP
    pub answer_timeout_secs: u64,
}

impl Default for ChatYamlConfig {
    fn default() -> Self {
        Self {
            prefer_persistent_channel: true,
            legacy_text_frames: false,
            answer_timeout_secs: 10,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub channel_url: String,
    pub reconnect: channel::ReconnectPolicy,
    pub retry: http::RetryPolicy,
    pub chat: chat::ChatSettings,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        Ok(Self {
            base_url: std::env::var("GR2_BASE_URL").unwrap_or(yaml.backend.base_url),
            channel_url: std::env::var("GR2_WS_URL").unwrap_or(yaml.channel.url),
            reconnect: channel::ReconnectPolicy {
                max_attempts: yaml.channel.max_reconnect_attempts,
                base_interval: Duration::from_millis(yaml.channel.base_interval_ms),
                max_interval: Duration::from_millis(yaml.channel.max_interval_ms),
                jitter: Duration::from_millis(yaml.channel.jitter_ms),
            },
            retry: http::RetryPolicy {
                max_attempts: yaml.retry.max_attempts,
                base_delay: Duration::from_millis(yaml.retry.base_delay_ms),
                max_delay: Duration::from_millis(yaml.retry.max_delay_ms),
                jitter: Duration::from_millis(yaml.retry.jitter_ms),
            },
            chat: chat::ChatSettings {
                prefer_persistent_channel: std::env::var("GR2_CHAT_OVER_CHANNEL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(yaml.chat.prefer_persistent_channel),
                legacy_text_frames: yaml.chat.legacy_text_frames,
                answer_timeout: Duration::from_secs(yaml.chat.answer_timeout_secs),
            },
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
