//! ChatSync facade
//!
//! Owns the state containers and wires the backend, the router, the action
//! coordinator and local storage together. All mutation goes through here,
//! and every mutation notifies subscribed listeners.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::actions::{ActionHandler, ActionId, ActionKind, Begun, Coordinator, Settled};
use crate::annotations::{AnnotationStore, PinnedSet};
use crate::backend::{ChannelsResponse, ChatBackend, PageCursor};
use crate::config::SyncConfig;
use crate::error::BackendError;
use crate::events::{Dispatch, EventRouter};
use crate::models::{ChannelId, ChannelRecord, Label, LabelId, MessageId};
use crate::observe::{Change, ChangeListener, ChangeSet, ListenerId, Observers};
use crate::query::{self, ChannelSummary};
use crate::storage::{KeyValueStore, LastRead, LastReadCache};
use crate::stream::{MessageStreamPage, PageDirection};
use crate::sync::{ChatState, RefreshStats, apply_bulk_snapshot, cooldown_elapsed};
use crate::unread::{DeltaOutcome, UnreadDelta};

/// Client-side synchronization layer for one signed-in user
pub struct ChatSync {
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn KeyValueStore>,
    config: SyncConfig,
    state: ChatState,
    router: EventRouter,
    coordinator: Coordinator,
    handler: ActionHandler,
    last_read: LastReadCache,
    observers: Observers,
    last_refresh_at: Option<DateTime<Utc>>,
}

impl ChatSync {
    /// Create the sync layer. Pinned channels are loaded from `store`.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn KeyValueStore>,
        current_user: impl Into<String>,
        config: SyncConfig,
    ) -> Self {
        let mut annotations = AnnotationStore::new(config.label_heal_after_cycles);
        annotations.replace_pins(PinnedSet::load(store.as_ref()));

        Self {
            handler: ActionHandler::new(backend.clone()),
            router: EventRouter::new(current_user, config.dedup_window(), config.retracted_placeholder.clone()),
            coordinator: Coordinator::new(config.retracted_placeholder.clone()),
            last_read: LastReadCache::new(store.clone(), config.last_read_ttl()),
            state: ChatState::new(annotations),
            observers: Observers::new(),
            last_refresh_at: None,
            backend,
            store,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn current_user(&self) -> &str {
        self.router.current_user()
    }

    /// Read-only view of all caches
    pub fn state(&self) -> &ChatState {
        &self.state
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn subscribe(&mut self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn publish(&self, changes: &ChangeSet) {
        if !changes.is_empty() {
            self.observers.notify(changes);
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Fetch the channel list and fold it in
    ///
    /// On failure the last known state is kept untouched.
    pub fn refresh(&mut self) -> Result<RefreshStats, BackendError> {
        let issued_at = Utc::now();
        let response = self.backend.list_channels().map_err(|e| {
            warn!("Channel refresh failed: {}", e);
            e
        })?;
        Ok(self.apply_snapshot(response, issued_at))
    }

    /// Refresh unless one completed within the cooldown
    pub fn refresh_if_due(&mut self, now: DateTime<Utc>) -> Result<Option<RefreshStats>, BackendError> {
        if !cooldown_elapsed(self.last_refresh_at, self.config.refresh_cooldown_secs, now) {
            debug!("Skipping refresh: cooldown not elapsed");
            return Ok(None);
        }
        self.refresh().map(Some)
    }

    /// Fold in a snapshot fetched by the caller; `fetched_at` is when the
    /// request was issued
    pub fn apply_snapshot(&mut self, response: ChannelsResponse, fetched_at: DateTime<Utc>) -> RefreshStats {
        let stats = apply_bulk_snapshot(&mut self.state, response, fetched_at);
        self.last_refresh_at = Some(self.last_refresh_at.map_or(fetched_at, |last| last.max(fetched_at)));
        self.publish(
            &[Change::ChannelList, Change::Unread, Change::Annotations]
                .into_iter()
                .collect(),
        );
        stats
    }

    /// Re-fetch one channel's unread count
    pub fn refresh_unread(&mut self, channel_id: &ChannelId) -> Result<DeltaOutcome, BackendError> {
        let fetched_at = Utc::now();
        let count = self.backend.fetch_unread_count(channel_id)?;
        let outcome = self
            .state
            .unread
            .apply_delta(channel_id, UnreadDelta::Set { count, fetched_at });
        if outcome == DeltaOutcome::Applied {
            self.publish(&[Change::Unread].into_iter().collect());
        }
        Ok(outcome)
    }

    // ========================================================================
    // Realtime events
    // ========================================================================

    pub fn handle_event(&mut self, name: &str, payload: &serde_json::Value) -> Dispatch {
        self.handle_event_at(name, payload, Utc::now())
    }

    /// Apply a push event received at `now`
    pub fn handle_event_at(&mut self, name: &str, payload: &serde_json::Value, now: DateTime<Utc>) -> Dispatch {
        let dispatch = self.router.dispatch(name, payload, &mut self.state, now);
        if let Dispatch::Applied(changes) = &dispatch {
            self.publish(changes);
        }
        dispatch
    }

    // ========================================================================
    // Focus and message streams
    // ========================================================================

    pub fn focus_channel(&mut self, channel_id: Option<ChannelId>) {
        self.focus_channel_at(channel_id, Utc::now());
    }

    /// Set the channel the user is looking at; opening a channel reads it
    pub fn focus_channel_at(&mut self, channel_id: Option<ChannelId>, now: DateTime<Utc>) {
        self.state.unread.set_focus(channel_id.clone());
        if let Some(channel_id) = channel_id {
            self.mark_read_at(&channel_id, now);
            self.mark_stream_seen(&channel_id);
        }
    }

    pub fn mark_read(&mut self, channel_id: &ChannelId) {
        self.mark_read_at(channel_id, Utc::now());
    }

    /// Reset the unread count and remember the newest message seen
    pub fn mark_read_at(&mut self, channel_id: &ChannelId, now: DateTime<Utc>) {
        self.state.unread.reset_to_zero(channel_id, now);

        if let Some(newest) = self.newest_message_id(channel_id)
            && let Err(e) = self.last_read.record(channel_id, newest, now)
        {
            warn!("{:#}", e);
        }
        self.publish(&[Change::Unread].into_iter().collect());
    }

    fn newest_message_id(&self, channel_id: &ChannelId) -> Option<MessageId> {
        let from_stream = self
            .state
            .streams
            .page(channel_id)
            .and_then(|page| page.newest())
            .map(|m| m.id.clone());
        from_stream.or_else(|| {
            self.state
                .channels
                .get(channel_id)
                .and_then(|r| r.last_message_preview.as_ref())
                .and_then(|p| p.message_id.clone())
        })
    }

    /// Last-read marker for a channel, if one is recorded and not expired
    pub fn last_read(&self, channel_id: &ChannelId) -> Option<LastRead> {
        self.last_read.get(channel_id, Utc::now()).unwrap_or_else(|e| {
            warn!("{:#}", e);
            None
        })
    }

    /// Fetch the newest page of a channel, focus it and mark it read
    pub fn open_stream(&mut self, channel_id: &ChannelId) -> Result<(), BackendError> {
        let fetched = self
            .backend
            .fetch_messages(channel_id, &PageCursor::Latest, self.config.page_size)?;
        let page = MessageStreamPage::new(fetched.messages, fetched.has_more, false);
        self.state.streams.open(channel_id.clone(), page);
        self.publish(&[Change::MessageStream(channel_id.clone())].into_iter().collect());
        self.focus_channel(Some(channel_id.clone()));
        Ok(())
    }

    /// Fetch the page before the oldest held message. Returns the number of
    /// messages received; zero if the stream is closed or exhausted.
    pub fn load_older(&mut self, channel_id: &ChannelId) -> Result<usize, BackendError> {
        self.load_page(channel_id, PageDirection::Older)
    }

    /// Fetch the page after the newest held message
    pub fn load_newer(&mut self, channel_id: &ChannelId) -> Result<usize, BackendError> {
        self.load_page(channel_id, PageDirection::Newer)
    }

    fn load_page(&mut self, channel_id: &ChannelId, direction: PageDirection) -> Result<usize, BackendError> {
        let Some(page) = self.state.streams.page(channel_id) else {
            return Ok(0);
        };
        let cursor = match direction {
            PageDirection::Older if page.has_older => page.messages.last().map(|m| PageCursor::Before(m.id.clone())),
            PageDirection::Newer if page.has_newer => page.newest().map(|m| PageCursor::After(m.id.clone())),
            _ => None,
        };
        let Some(cursor) = cursor else {
            return Ok(0);
        };

        let fetched = self.backend.fetch_messages(channel_id, &cursor, self.config.page_size)?;
        let received = fetched.messages.len();
        if let Some(page) = self.state.streams.page_mut(channel_id) {
            page.extend(fetched.messages, direction, fetched.has_more);
        }
        self.publish(&[Change::MessageStream(channel_id.clone())].into_iter().collect());
        Ok(received)
    }

    pub fn close_stream(&mut self, channel_id: &ChannelId) {
        if self.state.streams.close(channel_id).is_some() {
            self.publish(&[Change::MessageStream(channel_id.clone())].into_iter().collect());
        }
        if self.state.unread.is_focused(channel_id) {
            self.state.unread.set_focus(None);
        }
    }

    /// Clear the "new messages" marker of an open stream
    pub fn mark_stream_seen(&mut self, channel_id: &ChannelId) -> bool {
        let Some(page) = self.state.streams.page_mut(channel_id) else {
            return false;
        };
        if !page.has_new_messages {
            return false;
        }
        page.clear_new_messages();
        self.publish(&[Change::MessageStream(channel_id.clone())].into_iter().collect());
        true
    }

    // ========================================================================
    // Optimistic actions
    // ========================================================================

    /// Apply an action, confirm it with the server and roll back on failure
    pub fn perform(&mut self, kind: ActionKind) -> Settled {
        let handler = &self.handler;
        let (settled, changes) = self.coordinator.perform(kind.clone(), &mut self.state, |k| handler.call(k));
        self.after_action(&kind, &changes);
        settled
    }

    /// Apply an action now; confirm later with [`settle`](Self::settle)
    pub fn begin(&mut self, kind: ActionKind) -> Begun {
        let begun = self.coordinator.begin(kind.clone(), &mut self.state);
        self.after_action(&kind, begun.changes());
        begun
    }

    /// Issue the server call for a pending action and settle it
    pub fn confirm(&mut self, id: ActionId, kind: &ActionKind) -> Settled {
        let result = self.handler.call(kind);
        self.settle(id, result)
    }

    /// Resolve a pending action with the server's answer
    pub fn settle(&mut self, id: ActionId, result: Result<(), BackendError>) -> Settled {
        let settled = self.coordinator.settle(id, result, &mut self.state);
        match &settled {
            Settled::RolledBack(_, changes) => self.publish(changes),
            Settled::Superseded(failure) => {
                self.publish(&[Change::ActionFailed(failure.clone())].into_iter().collect());
            }
            Settled::Committed | Settled::Unknown => {}
        }
        settled
    }

    fn after_action(&mut self, kind: &ActionKind, changes: &ChangeSet) {
        if matches!(kind, ActionKind::TogglePin { .. })
            && let Err(e) = self.state.annotations.pins().save(self.store.as_ref())
        {
            warn!("{:#}", e);
        }
        self.publish(changes);
    }

    pub fn retract_message(&mut self, channel_id: &ChannelId, message_id: &MessageId) -> Settled {
        self.perform(ActionKind::RetractMessage {
            channel_id: channel_id.clone(),
            message_id: message_id.clone(),
        })
    }

    pub fn set_done(&mut self, channel_id: &ChannelId, is_done: bool) -> Settled {
        self.perform(ActionKind::SetDone {
            channel_id: channel_id.clone(),
            is_done,
        })
    }

    pub fn add_label(&mut self, channel_id: &ChannelId, label: Label) -> Settled {
        self.perform(ActionKind::AddLabel {
            channel_id: channel_id.clone(),
            label,
        })
    }

    pub fn remove_label(&mut self, channel_id: &ChannelId, label_id: &LabelId) -> Settled {
        self.perform(ActionKind::RemoveLabel {
            channel_id: channel_id.clone(),
            label_id: label_id.clone(),
        })
    }

    pub fn rename_channel(&mut self, channel_id: &ChannelId, display_name: &str) -> Settled {
        self.perform(ActionKind::RenameChannel {
            channel_id: channel_id.clone(),
            display_name: display_name.to_string(),
        })
    }

    /// Returns the new pinned state
    pub fn toggle_pin(&mut self, channel_id: &ChannelId) -> bool {
        self.perform(ActionKind::TogglePin {
            channel_id: channel_id.clone(),
        });
        self.state.annotations.is_pinned(channel_id)
    }

    pub fn rename_label(&mut self, label_id: &LabelId, label_text: &str) -> Settled {
        self.perform(ActionKind::RenameLabel {
            label_id: label_id.clone(),
            label_text: label_text.to_string(),
        })
    }

    pub fn delete_label(&mut self, label_id: &LabelId) -> Settled {
        self.perform(ActionKind::DeleteLabel {
            label_id: label_id.clone(),
        })
    }

    /// Record a label document created elsewhere (no server call)
    pub fn upsert_label(&mut self, label: Label) {
        self.state.annotations.upsert_label(label);
        self.publish(&[Change::Annotations].into_iter().collect());
    }

    // ========================================================================
    // Read models
    // ========================================================================

    pub fn sorted_channel_list(&self) -> Vec<ChannelSummary> {
        query::sorted_channel_list(&self.state, self.config.preview_max_chars)
    }

    pub fn unread_total(&self, filter: impl Fn(&ChannelRecord) -> bool) -> u64 {
        query::unread_total(&self.state, filter)
    }

    pub fn unread_count(&self, channel_id: &ChannelId) -> u32 {
        self.state.unread.unread_count(channel_id)
    }

    pub fn message_stream(&self, channel_id: &ChannelId) -> Option<&MessageStreamPage> {
        query::message_stream(&self.state, channel_id)
    }

    pub fn pinned_channels(&self) -> Vec<ChannelSummary> {
        query::pinned_channels(&self.state, self.config.preview_max_chars)
    }

    pub fn done_channels(&self) -> Vec<ChannelSummary> {
        query::done_channels(&self.state, self.config.preview_max_chars)
    }

    pub fn channels_with_label(&self, label_id: &LabelId) -> Vec<ChannelSummary> {
        query::channels_with_label(&self.state, label_id, self.config.preview_max_chars)
    }

    pub fn labels(&self) -> Vec<Label> {
        self.state.annotations.catalog()
    }
}
