//! Channel model: a group conversation or a direct message

use super::{LabelSet, MessageId, MessageType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a channel, shared by groups and direct messages
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    Group,
    DirectMessage,
}

/// Summary of the newest message in a channel, as shown in the channel list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessagePreview {
    #[serde(default)]
    pub message_id: Option<MessageId>,
    pub owner: String,
    /// Raw content: text (possibly HTML) or a file name
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub is_bot_message: bool,
    #[serde(default)]
    pub is_retracted: bool,
}

impl LastMessagePreview {
    /// Placeholder preview for a retracted message
    pub fn retracted(
        placeholder: &str,
        message_id: Option<MessageId>,
        owner: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            message_id,
            owner: owner.into(),
            text: placeholder.to_string(),
            message_type,
            is_bot_message: false,
            is_retracted: true,
        }
    }

    /// Short description for list rows
    ///
    /// Text is stripped of markup and cut to `max_chars` characters;
    /// attachments are described by kind.
    pub fn summary(&self, max_chars: usize) -> String {
        if self.is_retracted {
            return self.text.clone();
        }
        match self.message_type {
            MessageType::Text => truncate(&strip_tags(&self.text), max_chars),
            MessageType::Image => "sent an image".to_string(),
            MessageType::Audio => "sent audio".to_string(),
            MessageType::Poll => "sent a poll".to_string(),
            MessageType::File => describe_file(&self.text).to_string(),
            MessageType::System | MessageType::Other => String::new(),
        }
    }
}

fn describe_file(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "svg" => "sent an image",
        "mp4" | "mov" | "avi" | "wmv" | "flv" | "webm" | "mkv" => "sent a video",
        "mp3" | "wav" | "ogg" | "m4a" | "aac" => "sent audio",
        _ => "sent a file",
    }
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

/// A channel as held in the merged channel list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub kind: ChannelKind,
    pub display_name: String,
    /// The other participant; only set for direct messages
    #[serde(default)]
    pub peer_user_id: Option<String>,
    #[serde(default)]
    pub last_message_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message_preview: Option<LastMessagePreview>,
    #[serde(default)]
    pub is_archived: bool,
    /// Per-user done flag
    #[serde(default)]
    pub is_done: bool,
    /// Per-user labels; client-local once the channel is known
    #[serde(default)]
    pub user_labels: LabelSet,
    #[serde(default)]
    pub group_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChannelRecord {
    /// Create a group channel with no messages yet
    pub fn group(
        id: impl Into<ChannelId>,
        display_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ChannelKind::Group,
            display_name: display_name.into(),
            peer_user_id: None,
            last_message_timestamp: None,
            last_message_preview: None,
            is_archived: false,
            is_done: false,
            user_labels: LabelSet::new(),
            group_image: None,
            created_at,
        }
    }

    /// Create a direct-message channel with `peer_user_id`
    pub fn direct_message(
        id: impl Into<ChannelId>,
        peer_user_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let peer_user_id = peer_user_id.into();
        Self {
            kind: ChannelKind::DirectMessage,
            display_name: peer_user_id.clone(),
            peer_user_id: Some(peer_user_id),
            ..Self::group(id, String::new(), created_at)
        }
    }

    /// Builder method to set the last message
    pub fn with_last_message(mut self, preview: LastMessagePreview, at: DateTime<Utc>) -> Self {
        self.last_message_preview = Some(preview);
        self.last_message_timestamp = Some(at);
        self
    }

    /// Builder method to set labels
    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.user_labels = labels;
        self
    }

    /// Builder method to set the done flag
    pub fn with_done(mut self, is_done: bool) -> Self {
        self.is_done = is_done;
        self
    }

    /// Time used to order the channel list: last activity, or creation
    pub fn activity_at(&self) -> DateTime<Utc> {
        match self.last_message_timestamp {
            Some(ts) if ts > self.created_at => ts,
            _ => self.created_at,
        }
    }

    pub fn is_direct_message(&self) -> bool {
        self.kind == ChannelKind::DirectMessage
    }

    /// Whether `message_id` is the message shown as this channel's preview
    pub fn last_message_is(&self, message_id: &MessageId) -> bool {
        self.last_message_preview
            .as_ref()
            .and_then(|p| p.message_id.as_ref())
            .is_some_and(|id| id == message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn preview(text: &str, message_type: MessageType) -> LastMessagePreview {
        LastMessagePreview {
            message_id: None,
            owner: "alice".to_string(),
            text: text.to_string(),
            message_type,
            is_bot_message: false,
            is_retracted: false,
        }
    }

    #[test]
    fn test_summary_strips_markup_and_truncates() {
        let p = preview("<p>Hello <b>there</b>, friend</p>", MessageType::Text);
        assert_eq!(p.summary(10), "Hello ther...");
        assert_eq!(p.summary(100), "Hello there, friend");
    }

    #[test]
    fn test_summary_describes_files_by_extension() {
        assert_eq!(preview("photo.JPG", MessageType::File).summary(10), "sent an image");
        assert_eq!(preview("clip.mkv", MessageType::File).summary(10), "sent a video");
        assert_eq!(preview("notes.pdf", MessageType::File).summary(10), "sent a file");
        assert_eq!(preview("", MessageType::Image).summary(10), "sent an image");
    }

    #[test]
    fn test_retracted_summary_is_placeholder() {
        let p = LastMessagePreview::retracted("Message retracted", None, "bob", MessageType::Text);
        assert_eq!(p.summary(5), "Message retracted");
    }

    #[test]
    fn test_activity_falls_back_to_creation() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut record = ChannelRecord::group("c1", "general", created);
        assert_eq!(record.activity_at(), created);

        let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        record.last_message_timestamp = Some(later);
        assert_eq!(record.activity_at(), later);
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ChannelKind::DirectMessage).unwrap();
        assert_eq!(json, "\"direct-message\"");
    }
}
