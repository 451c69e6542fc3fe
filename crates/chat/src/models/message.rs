//! Message model for the per-channel message stream

use super::{ChannelId, LastMessagePreview};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a message
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of message content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Audio,
    Poll,
    System,
    #[serde(other)]
    Other,
}

/// Aggregated reactions for one emoji
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
    #[serde(default)]
    pub reacted_by: Vec<String>,
}

/// A message held in an open channel's stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    /// User id of the author
    pub owner: String,
    /// Text content, or the file name for file messages
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub message_type: MessageType,
    /// Creation time; streams are ordered by this, newest first
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub is_edited: bool,
    /// Retracted messages stay in the stream as tombstones
    #[serde(default)]
    pub is_retracted: bool,
    #[serde(default)]
    pub is_bot_message: bool,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub liked_by: Vec<String>,
}

impl StreamMessage {
    /// Create a new message builder
    pub fn builder(id: MessageId, channel_id: ChannelId) -> MessageBuilder {
        MessageBuilder::new(id, channel_id)
    }

    /// Preview of this message for the channel list
    pub fn preview(&self) -> LastMessagePreview {
        LastMessagePreview {
            message_id: Some(self.id.clone()),
            owner: self.owner.clone(),
            text: self.text.clone(),
            message_type: self.message_type,
            is_bot_message: self.is_bot_message,
            is_retracted: self.is_retracted,
        }
    }
}

/// Field-level update carried by an edit event
///
/// Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePatch {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub is_edited: Option<bool>,
}

impl MessagePatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.file_url.is_none() && self.is_edited.is_none()
    }

    pub fn apply_to(&self, message: &mut StreamMessage) {
        if let Some(text) = &self.text {
            message.text = text.clone();
        }
        if let Some(file_url) = &self.file_url {
            message.file_url = Some(file_url.clone());
        }
        if let Some(is_edited) = self.is_edited {
            message.is_edited = is_edited;
        }
    }
}

/// Builder for creating StreamMessage instances
pub struct MessageBuilder {
    id: MessageId,
    channel_id: ChannelId,
    owner: Option<String>,
    text: String,
    message_type: MessageType,
    created_at: Option<DateTime<Utc>>,
    file_url: Option<String>,
    is_bot_message: bool,
    reactions: Vec<Reaction>,
}

impl MessageBuilder {
    fn new(id: MessageId, channel_id: ChannelId) -> Self {
        Self {
            id,
            channel_id,
            owner: None,
            text: String::new(),
            message_type: MessageType::Text,
            created_at: None,
            file_url: None,
            is_bot_message: false,
            reactions: Vec::new(),
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn file_url(mut self, file_url: impl Into<String>) -> Self {
        self.file_url = Some(file_url.into());
        self
    }

    pub fn bot(mut self, is_bot_message: bool) -> Self {
        self.is_bot_message = is_bot_message;
        self
    }

    pub fn reactions(mut self, reactions: Vec<Reaction>) -> Self {
        self.reactions = reactions;
        self
    }

    pub fn build(self) -> StreamMessage {
        StreamMessage {
            id: self.id,
            channel_id: self.channel_id,
            owner: self.owner.unwrap_or_default(),
            text: self.text,
            message_type: self.message_type,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            file_url: self.file_url,
            is_edited: false,
            is_retracted: false,
            is_bot_message: self.is_bot_message,
            reactions: self.reactions,
            liked_by: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_only_writes_present_fields() {
        let mut msg = StreamMessage::builder(MessageId::new("m1"), ChannelId::new("c1"))
            .owner("alice")
            .text("hello")
            .build();

        MessagePatch {
            text: Some("hello, edited".to_string()),
            is_edited: Some(true),
            ..Default::default()
        }
        .apply_to(&mut msg);

        assert_eq!(msg.text, "hello, edited");
        assert!(msg.is_edited);
        assert_eq!(msg.owner, "alice");
        assert!(msg.file_url.is_none());
    }

    #[test]
    fn test_unknown_message_type_decodes_as_other() {
        let ty: MessageType = serde_json::from_str("\"Sticker\"").unwrap();
        assert_eq!(ty, MessageType::Other);
    }

    #[test]
    fn test_preview_carries_message_id() {
        let msg = StreamMessage::builder(MessageId::new("m9"), ChannelId::new("c1"))
            .owner("bob")
            .message_type(MessageType::Image)
            .build();
        let preview = msg.preview();
        assert_eq!(preview.message_id, Some(MessageId::new("m9")));
        assert_eq!(preview.message_type, MessageType::Image);
    }
}
