//! Pinned channels, persisted per installation

use anyhow::{Context, Result};
use log::warn;

use crate::models::ChannelId;
use crate::storage::KeyValueStore;

/// Storage key for the pinned channel list
pub const PINNED_CHANNELS_KEY: &str = "pinned_channels";

/// Ordered set of pinned channel ids
///
/// A pure client preference: never sent to the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinnedSet {
    order: Vec<ChannelId>,
}

impl PinnedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from storage; missing or unreadable data gives an empty set
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let raw = match store.get(PINNED_CHANNELS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::new(),
            Err(e) => {
                warn!("Failed to read pinned channels: {:#}", e);
                return Self::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => ids.into_iter().map(ChannelId::from).collect(),
            Err(e) => {
                warn!("Ignoring malformed pinned channel list: {}", e);
                Self::new()
            }
        }
    }

    /// Persist as a JSON list of ids
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        let ids: Vec<&str> = self.order.iter().map(|id| id.as_str()).collect();
        let raw = serde_json::to_string(&ids)?;
        store
            .set(PINNED_CHANNELS_KEY, &raw)
            .context("Failed to save pinned channels")
    }

    /// Remove if present, append if absent. Returns the new pinned state.
    pub fn toggle(&mut self, id: &ChannelId) -> bool {
        match self.order.iter().position(|p| p == id) {
            Some(idx) => {
                self.order.remove(idx);
                false
            }
            None => {
                self.order.push(id.clone());
                true
            }
        }
    }

    pub fn contains(&self, id: &ChannelId) -> bool {
        self.order.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelId> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<ChannelId> for PinnedSet {
    fn from_iter<I: IntoIterator<Item = ChannelId>>(iter: I) -> Self {
        let mut set = PinnedSet::new();
        for id in iter {
            if !set.contains(&id) {
                set.order.push(id);
            }
        }
        set
    }
}
