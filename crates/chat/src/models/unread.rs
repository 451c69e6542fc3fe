//! Unread count entry, keyed by channel

use super::{ChannelId, LastMessagePreview};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unread state for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreadEntry {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message_preview: Option<LastMessagePreview>,
    #[serde(default)]
    pub last_message_timestamp: Option<DateTime<Utc>>,
}

impl UnreadEntry {
    /// An entry with a count and no preview
    pub fn new(channel_id: impl Into<ChannelId>, unread_count: u32) -> Self {
        Self {
            channel_id: channel_id.into(),
            unread_count,
            last_message_preview: None,
            last_message_timestamp: None,
        }
    }

    /// Take `preview` if it is at least as new as the one held
    pub fn record_last_message(&mut self, preview: Option<LastMessagePreview>, at: Option<DateTime<Utc>>) {
        let newer = match (self.last_message_timestamp, at) {
            (Some(held), Some(incoming)) => incoming >= held,
            (None, _) => true,
            (Some(_), None) => false,
        };
        if newer {
            if preview.is_some() {
                self.last_message_preview = preview;
            }
            if at.is_some() {
                self.last_message_timestamp = at;
            }
        }
    }
}
