//! Chat crate - client-side synchronization layer for a messaging app
//!
//! This crate keeps a locally consistent view of channels, unread counts,
//! message streams and user annotations while three sources write to it:
//! - Bulk channel-list snapshots fetched from the server
//! - Realtime push events
//! - The user's own optimistic actions, confirmed or rolled back later
//!
//! It has no UI or transport dependencies. Hosts implement [`ChatBackend`]
//! and subscribe a [`ChangeListener`] to re-render.

pub mod actions;
pub mod annotations;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod merge;
pub mod models;
pub mod observe;
pub mod query;
pub mod storage;
pub mod stream;
pub mod sync;
pub mod unread;

pub use actions::{ActionFailure, ActionHandler, ActionId, ActionKind, Begun, Coordinator, EntityKey, Settled};
pub use annotations::{AnnotationStore, LabelScope, PinnedSet};
pub use backend::{ChannelsResponse, ChatBackend, FetchedMessages, PageCursor};
pub use client::ChatSync;
pub use config::SyncConfig;
pub use error::{BackendError, BackendErrorKind, EventDecodeError};
pub use events::{Dispatch, EventKind, EventRouter, RealtimeEvent};
pub use merge::{ChannelList, compare_activity, merge_channels};
pub use models::{
    ChannelId, ChannelKind, ChannelRecord, Label, LabelId, LabelSet, LastMessagePreview,
    MessageId, MessagePatch, MessageType, Reaction, StreamMessage, UnreadEntry,
};
pub use observe::{Change, ChangeListener, ChangeSet, ListenerId};
pub use query::ChannelSummary;
pub use storage::{InMemoryKeyValueStore, KeyValueStore, LastRead, LastReadCache, SqliteKeyValueStore};
pub use stream::{MessageStreamCache, MessageStreamPage, PageDirection};
pub use sync::{
    // Snapshot folding
    ChatState, RefreshStats, apply_bulk_snapshot,
    // Refresh timing
    cooldown_elapsed,
};
pub use unread::{BulkOutcome, DeltaOutcome, UnreadDelta, UnreadLedger};
