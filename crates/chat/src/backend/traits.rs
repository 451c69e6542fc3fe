//! Backend trait definitions

use crate::error::BackendError;
use crate::models::{ChannelId, ChannelRecord, Label, LabelId, MessageId, StreamMessage, UnreadEntry};

/// Result of the bulk "list channels" call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelsResponse {
    pub channels: Vec<ChannelRecord>,
    pub dm_channels: Vec<ChannelRecord>,
    /// Whether `user_labels` on the records reflect the server's label
    /// assignments. When false the label fields are ignored.
    pub includes_labels: bool,
    /// Per-channel unread counts, when the endpoint returns them
    pub unread: Option<Vec<UnreadEntry>>,
    /// The user's label documents, when the endpoint returns them
    pub labels: Option<Vec<Label>>,
}

/// Where a message page starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// The newest messages of the channel
    Latest,
    /// Messages created before this one
    Before(MessageId),
    /// Messages created after this one
    After(MessageId),
}

/// A page of messages returned by the backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedMessages {
    pub messages: Vec<StreamMessage>,
    /// More messages exist past this page in the requested direction
    pub has_more: bool,
}

/// Remote backend: one bulk fetch plus point RPCs
///
/// Every call either succeeds or returns a [`BackendError`] whose message
/// can be shown to the user.
pub trait ChatBackend: Send + Sync {
    /// Fetch every channel and direct message the user can see
    fn list_channels(&self) -> Result<ChannelsResponse, BackendError>;

    /// Current unread count for one channel
    fn fetch_unread_count(&self, channel_id: &ChannelId) -> Result<u32, BackendError>;

    /// Fetch a page of messages
    fn fetch_messages(
        &self,
        channel_id: &ChannelId,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<FetchedMessages, BackendError>;

    fn retract_message(&self, channel_id: &ChannelId, message_id: &MessageId) -> Result<(), BackendError>;

    fn set_channel_done(&self, channel_id: &ChannelId, is_done: bool) -> Result<(), BackendError>;

    fn add_channel_label(&self, channel_id: &ChannelId, label: &Label) -> Result<(), BackendError>;

    fn remove_channel_label(&self, channel_id: &ChannelId, label_id: &LabelId) -> Result<(), BackendError>;

    fn rename_channel(&self, channel_id: &ChannelId, display_name: &str) -> Result<(), BackendError>;

    fn rename_label(&self, label_id: &LabelId, label_text: &str) -> Result<(), BackendError>;

    /// Delete a label document; the server detaches it from every channel
    fn delete_label(&self, label_id: &LabelId) -> Result<(), BackendError>;
}
