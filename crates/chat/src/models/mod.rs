//! Domain models for channels, messages, labels and unread counts

mod channel;
mod label;
mod message;
mod unread;

pub use channel::{ChannelId, ChannelKind, ChannelRecord, LastMessagePreview};
pub use label::{Label, LabelId, LabelSet};
pub use message::{MessageBuilder, MessageId, MessagePatch, MessageType, Reaction, StreamMessage};
pub use unread::UnreadEntry;
