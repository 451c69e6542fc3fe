//! Routes realtime events into the caches

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use std::collections::HashMap;

use super::{EventKind, RealtimeEvent};
use crate::error::EventDecodeError;
use crate::models::{ChannelId, LastMessagePreview, MessageId, MessageType, StreamMessage};
use crate::observe::{Change, ChangeSet};
use crate::sync::ChatState;
use crate::unread::{DeltaOutcome, UnreadDelta};

/// What the router did with one event
#[derive(Debug)]
pub enum Dispatch {
    Applied(ChangeSet),
    /// Same kind, channel and message seen within the dedup window
    Duplicate,
    /// Rejected at decode time; nothing was touched
    Dropped(EventDecodeError),
}

impl Dispatch {
    /// Changes made, empty unless applied
    pub fn changes(&self) -> ChangeSet {
        match self {
            Dispatch::Applied(changes) => changes.clone(),
            _ => ChangeSet::new(),
        }
    }
}

type DedupKey = (EventKind, ChannelId, MessageId);

/// Folds push events into [`ChatState`]
///
/// Events are applied in arrival order. Message-scoped events repeated
/// within the dedup window are ignored. Events for channels that are not in
/// the list, or streams that are not open, touch nothing they cannot find.
pub struct EventRouter {
    current_user: String,
    window: Duration,
    retracted_placeholder: String,
    recent: HashMap<DedupKey, DateTime<Utc>>,
}

impl EventRouter {
    pub fn new(current_user: impl Into<String>, window: Duration, retracted_placeholder: impl Into<String>) -> Self {
        Self {
            current_user: current_user.into(),
            window,
            retracted_placeholder: retracted_placeholder.into(),
            recent: HashMap::new(),
        }
    }

    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    /// Decode a raw event and apply it
    pub fn dispatch(
        &mut self,
        name: &str,
        payload: &serde_json::Value,
        state: &mut ChatState,
        now: DateTime<Utc>,
    ) -> Dispatch {
        match RealtimeEvent::decode(name, payload, now) {
            Ok(event) => self.route(event, state, now),
            Err(e) => {
                warn!("Dropping realtime event {}: {}", name, e);
                Dispatch::Dropped(e)
            }
        }
    }

    /// Apply an already decoded event
    pub fn route(&mut self, event: RealtimeEvent, state: &mut ChatState, now: DateTime<Utc>) -> Dispatch {
        if self.is_duplicate(&event, now) {
            debug!(
                "Ignoring duplicate {} for {} in {}",
                event.kind(),
                event.message_id().map_or("-", |id| id.as_str()),
                event.channel_id()
            );
            return Dispatch::Duplicate;
        }

        let mut changes = ChangeSet::new();
        match event {
            RealtimeEvent::MessageCreated { message } => {
                self.on_message_created(message, state, now, &mut changes);
            }
            RealtimeEvent::MessageEdited {
                channel_id,
                message_id,
                patch,
            } => {
                if state.streams.edit(&channel_id, &message_id, &patch) {
                    changes.push(Change::MessageStream(channel_id));
                }
            }
            RealtimeEvent::MessageDeleted { channel_id, message_id } => {
                if state.streams.remove(&channel_id, &message_id).is_some() {
                    changes.push(Change::MessageStream(channel_id));
                }
            }
            RealtimeEvent::MessageReacted {
                channel_id,
                message_id,
                reactions,
            } => {
                if state.streams.set_reactions(&channel_id, &message_id, reactions) {
                    changes.push(Change::MessageStream(channel_id));
                }
            }
            RealtimeEvent::MessageSaved {
                channel_id,
                message_id,
                liked_by,
            } => {
                if state.streams.set_liked_by(&channel_id, &message_id, liked_by) {
                    changes.push(Change::MessageStream(channel_id));
                }
            }
            RealtimeEvent::MessageRetracted {
                channel_id,
                message_id,
                is_last_message,
                owner,
                message_type,
            } => {
                let before = state.streams.retract(&channel_id, &message_id);
                if before.is_some() {
                    changes.push(Change::MessageStream(channel_id.clone()));
                }
                let placed = place_retraction_preview(
                    state,
                    &self.retracted_placeholder,
                    &channel_id,
                    &message_id,
                    is_last_message,
                    owner,
                    message_type,
                );
                if placed {
                    changes.push(Change::ChannelList);
                    changes.push(Change::Unread);
                }
            }
            RealtimeEvent::ChannelUpdated {
                channel_id,
                display_name,
                group_image,
            } => {
                if state.channels.patch_details(&channel_id, display_name, group_image) {
                    changes.push(Change::ChannelList);
                } else {
                    debug!("channel_updated for unknown channel {}", channel_id);
                }
            }
            RealtimeEvent::MemberRemoved {
                channel_id,
                removed_user,
            } => {
                let is_me = removed_user.as_deref().is_none_or(|user| user == self.current_user);
                if is_me {
                    state.channels.remove(&channel_id);
                    state.unread.forget(&channel_id);
                    state.streams.drop_channel(&channel_id);
                    state.annotations.forget_channel(&channel_id);
                    changes.push(Change::ChannelList);
                    changes.push(Change::Unread);
                    changes.push(Change::MessageStream(channel_id));
                }
            }
            RealtimeEvent::ChannelDoneUpdated { channel_id, is_done } => {
                state.annotations.set_done(&channel_id, is_done);
                state.channels.set_done(&channel_id, is_done);
                changes.push(Change::Annotations);
                changes.push(Change::ChannelList);
            }
            RealtimeEvent::UnreadCountUpdated {
                channel_id,
                sent_by,
                last_message_timestamp,
                last_message_preview,
            } => {
                let last_message_preview =
                    last_message_preview.map(|p| state.channels.mask_retracted(&channel_id, p));
                state
                    .unread
                    .record_last_message(&channel_id, last_message_preview.clone(), last_message_timestamp);
                if let (Some(preview), Some(at)) = (last_message_preview, last_message_timestamp)
                    && state.channels.set_last_message(&channel_id, preview, at)
                {
                    changes.push(Change::ChannelList);
                }
                let mine = sent_by.as_deref() == Some(self.current_user.as_str());
                if mine || state.unread.is_focused(&channel_id) {
                    state.unread.reset_to_zero(&channel_id, now);
                }
                changes.push(Change::Unread);
            }
        }
        Dispatch::Applied(changes)
    }

    fn on_message_created(
        &self,
        message: StreamMessage,
        state: &mut ChatState,
        now: DateTime<Utc>,
        changes: &mut ChangeSet,
    ) {
        let channel_id = message.channel_id.clone();
        let preview = state.channels.mask_retracted(&channel_id, message.preview());
        let at = message.created_at;
        let mine = message.owner == self.current_user;

        if state.streams.upsert(message).is_some() {
            changes.push(Change::MessageStream(channel_id.clone()));
        }

        if mine {
            state.unread.record_last_message(&channel_id, Some(preview.clone()), Some(at));
            state.unread.reset_to_zero(&channel_id, now);
        } else {
            let outcome = state.unread.apply_delta(
                &channel_id,
                UnreadDelta::Increment {
                    preview: Some(preview.clone()),
                    message_at: Some(at),
                    observed_at: now,
                },
            );
            if outcome == DeltaOutcome::Buffered {
                debug!("Buffered unread increment for unknown channel {}", channel_id);
            }
            if matches!(outcome, DeltaOutcome::Applied | DeltaOutcome::Buffered)
                && let Some(page) = state.streams.page_mut(&channel_id)
            {
                page.flag_new_message();
            }
        }
        changes.push(Change::Unread);

        if state.channels.set_last_message(&channel_id, preview, at) {
            changes.push(Change::ChannelList);
        }
    }

    fn is_duplicate(&mut self, event: &RealtimeEvent, now: DateTime<Utc>) -> bool {
        let window = self.window;
        self.recent.retain(|_, seen| now - *seen < window);

        let Some(message_id) = event.message_id() else {
            return false;
        };
        let key = (event.kind(), event.channel_id().clone(), message_id.clone());
        if self.recent.contains_key(&key) {
            return true;
        }
        self.recent.insert(key, now);
        false
    }
}

/// Put the placeholder preview on a channel whose newest message was retracted
///
/// Applies when the server flags the message as the last one, or when the
/// held preview points at it. Unknown channels are left alone.
fn place_retraction_preview(
    state: &mut ChatState,
    placeholder: &str,
    channel_id: &ChannelId,
    message_id: &MessageId,
    is_last_message: bool,
    owner: Option<String>,
    message_type: MessageType,
) -> bool {
    let Some(record) = state.channels.get(channel_id) else {
        return false;
    };
    let ledger_preview = state
        .unread
        .entry(channel_id)
        .and_then(|e| e.last_message_preview.as_ref());
    let ledger_points_here = ledger_preview
        .and_then(|p| p.message_id.as_ref())
        .is_some_and(|id| id == message_id);
    if !(is_last_message || record.last_message_is(message_id) || ledger_points_here) {
        return false;
    }

    let owner = owner
        .or_else(|| record.last_message_preview.as_ref().map(|p| p.owner.clone()))
        .unwrap_or_default();
    let preview = LastMessagePreview::retracted(placeholder, Some(message_id.clone()), owner, message_type);
    state.channels.replace_preview(channel_id, Some(preview.clone()));
    state.unread.replace_preview(channel_id, Some(preview));
    true
}
