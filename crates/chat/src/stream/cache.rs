//! Per-channel message pages

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{ChannelId, MessageId, MessagePatch, Reaction, StreamMessage};

/// Which end of a stream a fetched page extends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    Older,
    Newer,
}

/// Result of inserting a message into a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Messages of one channel, newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageStreamPage {
    pub messages: Vec<StreamMessage>,
    /// More history exists before the oldest held message
    pub has_older: bool,
    /// More messages exist after the newest held message
    pub has_newer: bool,
    /// Messages from others arrived while the user was not watching
    #[serde(default)]
    pub has_new_messages: bool,
    #[serde(default)]
    pub new_message_count: u32,
}

impl MessageStreamPage {
    /// Build a page from fetched messages in any order
    pub fn new(messages: Vec<StreamMessage>, has_older: bool, has_newer: bool) -> Self {
        let mut page = Self {
            messages,
            has_older,
            has_newer,
            has_new_messages: false,
            new_message_count: 0,
        };
        page.dedup_and_sort();
        page
    }

    pub fn get(&self, id: &MessageId) -> Option<&StreamMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn newest(&self) -> Option<&StreamMessage> {
        self.messages.first()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Insert, or replace by id, then restore ordering
    pub fn upsert(&mut self, message: StreamMessage) -> Upsert {
        let result = match self.get_mut(&message.id) {
            Some(existing) => {
                *existing = message;
                Upsert::Replaced
            }
            None => {
                self.messages.push(message);
                Upsert::Inserted
            }
        };
        self.sort();
        result
    }

    /// Merge fields in place; ordering is left alone
    pub fn edit(&mut self, id: &MessageId, patch: &MessagePatch) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                patch.apply_to(message);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<StreamMessage> {
        let idx = self.messages.iter().position(|m| &m.id == id)?;
        Some(self.messages.remove(idx))
    }

    pub fn set_reactions(&mut self, id: &MessageId, reactions: Vec<Reaction>) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.reactions = reactions;
                true
            }
            None => false,
        }
    }

    pub fn set_liked_by(&mut self, id: &MessageId, liked_by: Vec<String>) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.liked_by = liked_by;
                true
            }
            None => false,
        }
    }

    /// Tombstone a message, returning its state before retraction
    pub fn retract(&mut self, id: &MessageId) -> Option<StreamMessage> {
        let message = self.get_mut(id)?;
        let before = message.clone();
        message.is_retracted = true;
        Some(before)
    }

    /// Merge a fetched page onto one end of the stream
    ///
    /// Messages already held are replaced by the fetched copy, except that a
    /// held tombstone stays retracted.
    pub fn extend(&mut self, messages: Vec<StreamMessage>, direction: PageDirection, has_more: bool) {
        let tombstones: HashSet<MessageId> = self
            .messages
            .iter()
            .filter(|m| m.is_retracted)
            .map(|m| m.id.clone())
            .collect();
        self.messages.extend(messages);
        self.dedup_and_sort();
        for message in self.messages.iter_mut().filter(|m| tombstones.contains(&m.id)) {
            message.is_retracted = true;
        }
        match direction {
            PageDirection::Older => self.has_older = has_more,
            PageDirection::Newer => self.has_newer = has_more,
        }
    }

    pub fn flag_new_message(&mut self) {
        self.has_new_messages = true;
        self.new_message_count = self.new_message_count.saturating_add(1);
    }

    pub fn clear_new_messages(&mut self) {
        self.has_new_messages = false;
        self.new_message_count = 0;
    }

    fn get_mut(&mut self, id: &MessageId) -> Option<&mut StreamMessage> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    fn sort(&mut self) {
        self.messages.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
    }

    // Later copies win, matching the order pages arrive in.
    fn dedup_and_sort(&mut self) {
        let mut latest: HashMap<MessageId, usize> = HashMap::new();
        for (idx, message) in self.messages.iter().enumerate() {
            latest.insert(message.id.clone(), idx);
        }
        let mut idx = 0;
        self.messages.retain(|m| {
            let keep = latest.get(&m.id) == Some(&idx);
            idx += 1;
            keep
        });
        self.sort();
    }
}

/// Pages for every open channel
///
/// Operations on a channel whose stream is not open are ignored and
/// report `false` / `None`.
#[derive(Debug, Clone, Default)]
pub struct MessageStreamCache {
    streams: HashMap<ChannelId, MessageStreamPage>,
}

impl MessageStreamCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly fetched page for a channel, replacing any held one
    pub fn open(&mut self, channel_id: ChannelId, page: MessageStreamPage) {
        self.streams.insert(channel_id, page);
    }

    pub fn close(&mut self, channel_id: &ChannelId) -> Option<MessageStreamPage> {
        self.streams.remove(channel_id)
    }

    pub fn is_open(&self, channel_id: &ChannelId) -> bool {
        self.streams.contains_key(channel_id)
    }

    pub fn page(&self, channel_id: &ChannelId) -> Option<&MessageStreamPage> {
        self.streams.get(channel_id)
    }

    pub fn page_mut(&mut self, channel_id: &ChannelId) -> Option<&mut MessageStreamPage> {
        self.streams.get_mut(channel_id)
    }

    pub fn open_channels(&self) -> impl Iterator<Item = &ChannelId> {
        self.streams.keys()
    }

    pub fn upsert(&mut self, message: StreamMessage) -> Option<Upsert> {
        let page = self.streams.get_mut(&message.channel_id)?;
        Some(page.upsert(message))
    }

    pub fn edit(&mut self, channel_id: &ChannelId, id: &MessageId, patch: &MessagePatch) -> bool {
        self.streams
            .get_mut(channel_id)
            .is_some_and(|page| page.edit(id, patch))
    }

    pub fn remove(&mut self, channel_id: &ChannelId, id: &MessageId) -> Option<StreamMessage> {
        self.streams.get_mut(channel_id)?.remove(id)
    }

    pub fn set_reactions(&mut self, channel_id: &ChannelId, id: &MessageId, reactions: Vec<Reaction>) -> bool {
        self.streams
            .get_mut(channel_id)
            .is_some_and(|page| page.set_reactions(id, reactions))
    }

    pub fn set_liked_by(&mut self, channel_id: &ChannelId, id: &MessageId, liked_by: Vec<String>) -> bool {
        self.streams
            .get_mut(channel_id)
            .is_some_and(|page| page.set_liked_by(id, liked_by))
    }

    pub fn retract(&mut self, channel_id: &ChannelId, id: &MessageId) -> Option<StreamMessage> {
        self.streams.get_mut(channel_id)?.retract(id)
    }

    /// Put a message back exactly as captured (used by rollbacks)
    pub fn restore(&mut self, message: StreamMessage) -> bool {
        self.upsert(message).is_some()
    }

    pub fn drop_channel(&mut self, channel_id: &ChannelId) {
        self.streams.remove(channel_id);
    }
}
