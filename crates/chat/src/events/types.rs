//! Typed realtime events and their wire decoding

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt;

use crate::error::EventDecodeError;
use crate::models::{
    ChannelId, LastMessagePreview, MessageId, MessagePatch, MessageType, Reaction, StreamMessage,
};

/// Kind of a realtime event, one per wire name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageCreated,
    MessageEdited,
    MessageDeleted,
    MessageReacted,
    MessageSaved,
    MessageRetracted,
    ChannelUpdated,
    MemberRemoved,
    ChannelDoneUpdated,
    UnreadCountUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::MessageCreated,
        EventKind::MessageEdited,
        EventKind::MessageDeleted,
        EventKind::MessageReacted,
        EventKind::MessageSaved,
        EventKind::MessageRetracted,
        EventKind::ChannelUpdated,
        EventKind::MemberRemoved,
        EventKind::ChannelDoneUpdated,
        EventKind::UnreadCountUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageCreated => "message_created",
            EventKind::MessageEdited => "message_edited",
            EventKind::MessageDeleted => "message_deleted",
            EventKind::MessageReacted => "message_reacted",
            EventKind::MessageSaved => "message_saved",
            EventKind::MessageRetracted => "message_retracted",
            EventKind::ChannelUpdated => "channel_updated",
            EventKind::MemberRemoved => "member_removed",
            EventKind::ChannelDoneUpdated => "channel_done_updated",
            EventKind::UnreadCountUpdated => "unread_channel_count_updated",
        }
    }

    /// Look up a wire name. A namespace prefix such as `chat:` is ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let bare = name.rsplit_once(':').map_or(name, |(_, bare)| bare);
        Self::ALL.into_iter().find(|kind| kind.as_str() == bare)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded push event
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    MessageCreated {
        message: StreamMessage,
    },
    MessageEdited {
        channel_id: ChannelId,
        message_id: MessageId,
        patch: MessagePatch,
    },
    MessageDeleted {
        channel_id: ChannelId,
        message_id: MessageId,
    },
    MessageReacted {
        channel_id: ChannelId,
        message_id: MessageId,
        reactions: Vec<Reaction>,
    },
    MessageSaved {
        channel_id: ChannelId,
        message_id: MessageId,
        liked_by: Vec<String>,
    },
    MessageRetracted {
        channel_id: ChannelId,
        message_id: MessageId,
        /// Server says this was the channel's newest message
        is_last_message: bool,
        owner: Option<String>,
        message_type: MessageType,
    },
    ChannelUpdated {
        channel_id: ChannelId,
        display_name: Option<String>,
        /// `Some(None)` clears the image
        group_image: Option<Option<String>>,
    },
    MemberRemoved {
        channel_id: ChannelId,
        /// The member who left; absent means the current user
        removed_user: Option<String>,
    },
    ChannelDoneUpdated {
        channel_id: ChannelId,
        is_done: bool,
    },
    UnreadCountUpdated {
        channel_id: ChannelId,
        sent_by: Option<String>,
        last_message_timestamp: Option<DateTime<Utc>>,
        last_message_preview: Option<LastMessagePreview>,
    },
}

impl RealtimeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RealtimeEvent::MessageCreated { .. } => EventKind::MessageCreated,
            RealtimeEvent::MessageEdited { .. } => EventKind::MessageEdited,
            RealtimeEvent::MessageDeleted { .. } => EventKind::MessageDeleted,
            RealtimeEvent::MessageReacted { .. } => EventKind::MessageReacted,
            RealtimeEvent::MessageSaved { .. } => EventKind::MessageSaved,
            RealtimeEvent::MessageRetracted { .. } => EventKind::MessageRetracted,
            RealtimeEvent::ChannelUpdated { .. } => EventKind::ChannelUpdated,
            RealtimeEvent::MemberRemoved { .. } => EventKind::MemberRemoved,
            RealtimeEvent::ChannelDoneUpdated { .. } => EventKind::ChannelDoneUpdated,
            RealtimeEvent::UnreadCountUpdated { .. } => EventKind::UnreadCountUpdated,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        match self {
            RealtimeEvent::MessageCreated { message } => &message.channel_id,
            RealtimeEvent::MessageEdited { channel_id, .. }
            | RealtimeEvent::MessageDeleted { channel_id, .. }
            | RealtimeEvent::MessageReacted { channel_id, .. }
            | RealtimeEvent::MessageSaved { channel_id, .. }
            | RealtimeEvent::MessageRetracted { channel_id, .. }
            | RealtimeEvent::ChannelUpdated { channel_id, .. }
            | RealtimeEvent::MemberRemoved { channel_id, .. }
            | RealtimeEvent::ChannelDoneUpdated { channel_id, .. }
            | RealtimeEvent::UnreadCountUpdated { channel_id, .. } => channel_id,
        }
    }

    /// The message the event is about, for message-scoped events
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            RealtimeEvent::MessageCreated { message } => Some(&message.id),
            RealtimeEvent::MessageEdited { message_id, .. }
            | RealtimeEvent::MessageDeleted { message_id, .. }
            | RealtimeEvent::MessageReacted { message_id, .. }
            | RealtimeEvent::MessageSaved { message_id, .. }
            | RealtimeEvent::MessageRetracted { message_id, .. } => Some(message_id),
            _ => None,
        }
    }

    /// Decode a raw event by wire name
    ///
    /// `received_at` stands in for a missing creation time on new messages.
    pub fn decode(
        name: &str,
        payload: &serde_json::Value,
        received_at: DateTime<Utc>,
    ) -> Result<Self, EventDecodeError> {
        let kind = EventKind::from_name(name).ok_or_else(|| EventDecodeError::UnknownKind(name.to_string()))?;
        let raw = RawEvent::deserialize(payload).map_err(|source| EventDecodeError::Malformed {
            event: kind.as_str().to_string(),
            source,
        })?;

        let missing = |field: &'static str| EventDecodeError::MissingField {
            event: kind.as_str().to_string(),
            field,
        };
        let channel_id = raw
            .channel_id
            .clone()
            .filter(|id| !id.is_empty())
            .map(ChannelId::from)
            .ok_or_else(|| missing("channel_id"))?;
        let message_id = || {
            raw.message_id
                .clone()
                .filter(|id| !id.is_empty())
                .map(MessageId::from)
                .ok_or_else(|| missing("message_id"))
        };

        let event = match kind {
            EventKind::MessageCreated => {
                let mut builder = StreamMessage::builder(message_id()?, channel_id)
                    .owner(raw.owner.clone().ok_or_else(|| missing("owner"))?)
                    .text(raw.text.clone().unwrap_or_default())
                    .message_type(raw.message_type.unwrap_or_default())
                    .created_at(raw.timestamp.unwrap_or(received_at))
                    .bot(raw.is_bot_message.unwrap_or(false))
                    .reactions(raw.reactions.clone().unwrap_or_default());
                if let Some(file) = raw.file.clone() {
                    builder = builder.file_url(file);
                }
                RealtimeEvent::MessageCreated {
                    message: builder.build(),
                }
            }
            EventKind::MessageEdited => RealtimeEvent::MessageEdited {
                channel_id,
                message_id: message_id()?,
                patch: MessagePatch {
                    text: raw.text.clone(),
                    file_url: raw.file.clone(),
                    is_edited: Some(raw.is_edited.unwrap_or(true)),
                },
            },
            EventKind::MessageDeleted => RealtimeEvent::MessageDeleted {
                channel_id,
                message_id: message_id()?,
            },
            EventKind::MessageReacted => RealtimeEvent::MessageReacted {
                channel_id,
                message_id: message_id()?,
                reactions: raw.reactions.clone().ok_or_else(|| missing("reactions"))?,
            },
            EventKind::MessageSaved => RealtimeEvent::MessageSaved {
                channel_id,
                message_id: message_id()?,
                liked_by: raw.liked_by.clone().unwrap_or_default(),
            },
            EventKind::MessageRetracted => RealtimeEvent::MessageRetracted {
                channel_id,
                message_id: message_id()?,
                is_last_message: raw.is_last_message.unwrap_or(false),
                owner: raw.owner.clone(),
                message_type: raw.message_type.unwrap_or_default(),
            },
            EventKind::ChannelUpdated => RealtimeEvent::ChannelUpdated {
                channel_id,
                display_name: raw.channel_name.clone(),
                group_image: raw
                    .group_image
                    .clone()
                    .map(|image| Some(image).filter(|i| !i.is_empty())),
            },
            EventKind::MemberRemoved => RealtimeEvent::MemberRemoved {
                channel_id,
                removed_user: raw.removed_user.clone(),
            },
            EventKind::ChannelDoneUpdated => RealtimeEvent::ChannelDoneUpdated {
                channel_id,
                is_done: raw.is_done.ok_or_else(|| missing("is_done"))?,
            },
            EventKind::UnreadCountUpdated => RealtimeEvent::UnreadCountUpdated {
                channel_id,
                sent_by: raw.sent_by.clone(),
                last_message_timestamp: raw.last_message_timestamp,
                last_message_preview: raw.last_message_details.clone(),
            },
        };
        Ok(event)
    }
}

/// Union of every field any event kind carries
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEvent {
    channel_id: Option<String>,
    message_id: Option<String>,
    owner: Option<String>,
    #[serde(alias = "content")]
    text: Option<String>,
    message_type: Option<MessageType>,
    file: Option<String>,
    #[serde(deserialize_with = "flag")]
    is_bot_message: Option<bool>,
    #[serde(alias = "creation")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "flag")]
    is_edited: Option<bool>,
    reactions: Option<Vec<Reaction>>,
    liked_by: Option<Vec<String>>,
    #[serde(deserialize_with = "flag")]
    is_last_message: Option<bool>,
    channel_name: Option<String>,
    group_image: Option<String>,
    removed_user: Option<String>,
    #[serde(deserialize_with = "flag")]
    is_done: Option<bool>,
    sent_by: Option<String>,
    last_message_timestamp: Option<DateTime<Utc>>,
    last_message_details: Option<LastMessagePreview>,
}

/// Flags arrive either as booleans or as 0/1
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(Option::<Flag>::deserialize(deserializer)?.map(|flag| match flag {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    }))
}
