//! Sync layer configuration
//!
//! Loaded in order of priority:
//! 1. JSON file (~/.config/chatsync/chat-sync.json)
//! 2. Environment overrides for the tunables people actually change
//! 3. Built-in defaults

use anyhow::{Context, Result};
use chrono::Duration;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config filename in the chatsync config directory
pub const CONFIG_FILE: &str = "chat-sync.json";

const ENV_DEDUP_WINDOW_MS: &str = "CHAT_SYNC_DEDUP_WINDOW_MS";
const ENV_REFRESH_COOLDOWN_SECS: &str = "CHAT_SYNC_REFRESH_COOLDOWN_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Repeats of a message-scoped event within this window are ignored
    pub dedup_window_ms: u64,
    /// Characters of message text shown in a list row
    pub preview_max_chars: usize,
    /// Last-read markers older than this read as absent
    pub last_read_ttl_days: u32,
    /// Disagreeing refreshes tolerated before labels heal to the server's set
    pub label_heal_after_cycles: u32,
    /// Minimum time between timer-driven refreshes
    pub refresh_cooldown_secs: u64,
    /// Preview text for a channel whose last message was retracted
    pub retracted_placeholder: String,
    /// Messages fetched per stream page
    pub page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: 1000,
            preview_max_chars: 10,
            last_read_ttl_days: 7,
            label_heal_after_cycles: 1,
            refresh_cooldown_secs: 30,
            retracted_placeholder: "Message retracted".to_string(),
            page_size: 50,
        }
    }
}

impl SyncConfig {
    /// Load from the config directory, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config = config::load_json_if_exists::<SyncConfig>(CONFIG_FILE)?.unwrap_or_default();
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Load from a specific JSON file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: SyncConfig = config::load_json_file(path)
            .with_context(|| format!("Failed to load sync config from {}", path.display()))?;
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from `lookup`; unparsable values are ignored
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_DEDUP_WINDOW_MS) {
            match raw.trim().parse() {
                Ok(ms) => self.dedup_window_ms = ms,
                Err(_) => warn!("Ignoring invalid {}: {:?}", ENV_DEDUP_WINDOW_MS, raw),
            }
        }
        if let Some(raw) = lookup(ENV_REFRESH_COOLDOWN_SECS) {
            match raw.trim().parse() {
                Ok(secs) => self.refresh_cooldown_secs = secs,
                Err(_) => warn!("Ignoring invalid {}: {:?}", ENV_REFRESH_COOLDOWN_SECS, raw),
            }
        }
        self
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.dedup_window_ms).unwrap_or(i64::MAX))
    }

    pub fn last_read_ttl(&self) -> Duration {
        Duration::days(i64::from(self.last_read_ttl_days))
    }

    /// Write to the config directory
    pub fn save(&self) -> Result<()> {
        config::save_json(CONFIG_FILE, self)
    }
}
