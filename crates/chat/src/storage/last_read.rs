//! Per-channel last-read markers with expiry

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::KeyValueStore;
use crate::models::{ChannelId, MessageId};

/// Key prefix for last-read markers
pub const LAST_READ_PREFIX: &str = "last_read:";

/// The newest message the user has seen in a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRead {
    pub message_id: MessageId,
    pub read_at: DateTime<Utc>,
}

/// Last-read markers, dropped once older than the configured lifetime
pub struct LastReadCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl LastReadCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(channel_id: &ChannelId) -> String {
        format!("{LAST_READ_PREFIX}{channel_id}")
    }

    pub fn record(&self, channel_id: &ChannelId, message_id: MessageId, read_at: DateTime<Utc>) -> Result<()> {
        let raw = serde_json::to_string(&LastRead { message_id, read_at })?;
        self.store
            .set(&Self::key(channel_id), &raw)
            .with_context(|| format!("Failed to save last-read marker for {channel_id}"))
    }

    /// Marker for a channel, or `None` if absent, expired or unreadable
    pub fn get(&self, channel_id: &ChannelId, now: DateTime<Utc>) -> Result<Option<LastRead>> {
        let key = Self::key(channel_id);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(None);
        };
        let marker: LastRead = match serde_json::from_str(&raw) {
            Ok(marker) => marker,
            Err(e) => {
                warn!("Dropping malformed last-read marker for {}: {}", channel_id, e);
                self.store.remove(&key)?;
                return Ok(None);
            }
        };
        if now - marker.read_at > self.ttl {
            debug!("Last-read marker for {} expired", channel_id);
            self.store.remove(&key)?;
            return Ok(None);
        }
        Ok(Some(marker))
    }

    pub fn clear(&self, channel_id: &ChannelId) -> Result<()> {
        self.store.remove(&Self::key(channel_id))
    }

    /// Remove every expired marker, returning how many were dropped
    pub fn prune(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut pruned = 0;
        for key in self.store.keys_with_prefix(LAST_READ_PREFIX)? {
            let channel_id = ChannelId::new(&key[LAST_READ_PREFIX.len()..]);
            if self.store.get(&key)?.is_some() && self.get(&channel_id, now)?.is_none() {
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}
