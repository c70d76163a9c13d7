//! Configuration for framebridge.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $FRAMEBRIDGE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/framebridge/config.toml
//!   3. ~/.config/framebridge/config.toml

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::MergePolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Process-wide debug flag. Raises log verbosity only.
    pub debug: bool,
    pub handshake: HandshakeConfig,
    pub model: ModelConfig,
    pub channel: ChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Spacing between handshake offers.
    pub interval_ms: u64,
    /// Offers sent before giving up.
    pub max_attempts: u32,
    /// Fail the pairing one interval after the last unanswered offer.
    /// When false the pairing stays pending once offers stop.
    pub reject_on_exhaustion: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Precedence for keys present in both models at handshake time.
    pub merge: MergePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Messages buffered per context inbox before slow listeners lag.
    pub inbox_capacity: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            max_attempts: 5,
            reject_on_exhaustion: true,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 256,
        }
    }
}

impl HandshakeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".config"))
        .join("framebridge")
}

fn home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BridgeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            BridgeConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("FRAMEBRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BridgeConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply FRAMEBRIDGE_* overrides. `lookup` stands in for the process
    /// environment so tests need not mutate it.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |v: String| v == "true" || v == "1";

        if let Some(v) = lookup("FRAMEBRIDGE_DEBUG") {
            self.debug = flag(v);
        }
        if let Some(v) = lookup("FRAMEBRIDGE_HANDSHAKE__INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.handshake.interval_ms = ms;
            }
        }
        if let Some(v) = lookup("FRAMEBRIDGE_HANDSHAKE__MAX_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.handshake.max_attempts = n;
            }
        }
        if let Some(v) = lookup("FRAMEBRIDGE_HANDSHAKE__REJECT_ON_EXHAUSTION") {
            self.handshake.reject_on_exhaustion = flag(v);
        }
        if let Some(v) = lookup("FRAMEBRIDGE_CHANNEL__INBOX_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.channel.inbox_capacity = n;
            }
        }
        if let Some(v) = lookup("FRAMEBRIDGE_MODEL__MERGE") {
            match v.as_str() {
                "responder-wins" => self.model.merge = MergePolicy::ResponderWins,
                "initiator-wins" => self.model.merge = MergePolicy::InitiatorWins,
                other => tracing::warn!(value = other, "ignoring unknown merge policy"),
            }
        }
    }
}
