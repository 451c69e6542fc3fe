//! Unread ledger implementation

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{HashMap, HashSet};

use crate::models::{ChannelId, LastMessagePreview, UnreadEntry};

/// A change to one channel's unread count
#[derive(Debug, Clone, PartialEq)]
pub enum UnreadDelta {
    /// Absolute count from a per-channel fetch issued at `fetched_at`
    Set { count: u32, fetched_at: DateTime<Utc> },
    /// One new message from another user, observed locally at `observed_at`
    Increment {
        preview: Option<LastMessagePreview>,
        message_at: Option<DateTime<Utc>>,
        observed_at: DateTime<Utc>,
    },
}

/// What [`UnreadLedger::apply_delta`] did with a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied,
    /// The channel is focused, so the message counts as seen
    Suppressed,
    /// A local change newer than the fetch already exists
    Stale,
    /// The channel is not in the channel list yet; held until it is
    Buffered,
}

/// Result of a full resynchronization
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Channels whose count was taken from the snapshot
    pub replaced: usize,
    /// Channels whose newer local count was kept
    pub kept_local: usize,
    /// Channels missing from the snapshot, reset to zero
    pub cleared: usize,
}

#[derive(Debug, Clone)]
struct Slot {
    entry: UnreadEntry,
    /// Time of the last count change: a local observation or a fetch issue time
    updated_at: DateTime<Utc>,
}

impl Slot {
    fn empty(channel_id: &ChannelId) -> Self {
        Self {
            entry: UnreadEntry::new(channel_id.clone(), 0),
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }
}

/// Authoritative table of unread entries
///
/// Counts are only lowered by an explicit reset or by a snapshot whose fetch
/// was issued strictly after the last local change. Deltas for channels not
/// yet in the channel list are buffered, never dropped.
#[derive(Debug, Clone, Default)]
pub struct UnreadLedger {
    entries: HashMap<ChannelId, Slot>,
    pending: HashMap<ChannelId, Slot>,
    known: HashSet<ChannelId>,
    focused: Option<ChannelId>,
}

impl UnreadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries for known channels, ordered by channel id
    pub fn get(&self) -> Vec<UnreadEntry> {
        let mut entries: Vec<UnreadEntry> =
            self.entries.values().map(|slot| slot.entry.clone()).collect();
        entries.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        entries
    }

    pub fn entry(&self, channel_id: &ChannelId) -> Option<&UnreadEntry> {
        self.entries.get(channel_id).map(|slot| &slot.entry)
    }

    /// Unread count for a known channel (zero if none recorded)
    pub fn unread_count(&self, channel_id: &ChannelId) -> u32 {
        self.entry(channel_id).map_or(0, |e| e.unread_count)
    }

    /// Number of channels with buffered, not yet surfaced state
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn focused(&self) -> Option<&ChannelId> {
        self.focused.as_ref()
    }

    pub fn is_focused(&self, channel_id: &ChannelId) -> bool {
        self.focused.as_ref() == Some(channel_id)
    }

    /// Set the channel the user is looking at
    pub fn set_focus(&mut self, channel_id: Option<ChannelId>) {
        self.focused = channel_id;
    }

    /// Sum of counts over known channels accepted by `filter`
    pub fn total(&self, filter: impl Fn(&UnreadEntry) -> bool) -> u64 {
        self.entries
            .values()
            .map(|slot| &slot.entry)
            .filter(|entry| filter(entry))
            .map(|entry| u64::from(entry.unread_count))
            .sum()
    }

    /// Tell the ledger which channels exist
    ///
    /// Buffered state for channels that now exist is surfaced; entries for
    /// channels that disappeared go back to the buffer. Returns the surfaced ids.
    pub fn sync_known_channels<I>(&mut self, ids: I) -> Vec<ChannelId>
    where
        I: IntoIterator<Item = ChannelId>,
    {
        self.known = ids.into_iter().collect();

        let departed: Vec<ChannelId> = self
            .entries
            .keys()
            .filter(|id| !self.known.contains(*id))
            .cloned()
            .collect();
        for id in departed {
            if let Some(slot) = self.entries.remove(&id) {
                self.pending.insert(id, slot);
            }
        }

        let mut surfaced: Vec<ChannelId> = self
            .pending
            .keys()
            .filter(|id| self.known.contains(*id))
            .cloned()
            .collect();
        surfaced.sort();
        for id in &surfaced {
            if let Some(slot) = self.pending.remove(id) {
                debug!("Surfacing buffered unread state for {}", id);
                self.entries.insert(id.clone(), slot);
            }
        }
        surfaced
    }

    /// Drop all state for a channel the user can no longer see
    pub fn forget(&mut self, channel_id: &ChannelId) {
        self.entries.remove(channel_id);
        self.pending.remove(channel_id);
        self.known.remove(channel_id);
        if self.is_focused(channel_id) {
            self.focused = None;
        }
    }

    /// Apply an absolute or incremental change to one channel
    pub fn apply_delta(&mut self, channel_id: &ChannelId, delta: UnreadDelta) -> DeltaOutcome {
        let known = self.known.contains(channel_id);
        let focused = self.is_focused(channel_id);
        let slot = self.slot_mut(channel_id);

        let outcome = match delta {
            UnreadDelta::Increment {
                preview,
                message_at,
                observed_at,
            } => {
                slot.entry.record_last_message(preview, message_at);
                if focused {
                    DeltaOutcome::Suppressed
                } else {
                    slot.entry.unread_count = slot.entry.unread_count.saturating_add(1);
                    slot.updated_at = slot.updated_at.max(observed_at);
                    DeltaOutcome::Applied
                }
            }
            UnreadDelta::Set { count, fetched_at } => {
                if fetched_at > slot.updated_at {
                    slot.entry.unread_count = count;
                    slot.updated_at = fetched_at;
                    DeltaOutcome::Applied
                } else {
                    DeltaOutcome::Stale
                }
            }
        };

        match outcome {
            DeltaOutcome::Applied if !known => DeltaOutcome::Buffered,
            other => other,
        }
    }

    /// Record a last-message preview without changing the count
    pub fn record_last_message(
        &mut self,
        channel_id: &ChannelId,
        preview: Option<LastMessagePreview>,
        at: Option<DateTime<Utc>>,
    ) {
        self.slot_mut(channel_id).entry.record_last_message(preview, at);
    }

    /// Overwrite the held preview, returning the previous one
    pub fn replace_preview(
        &mut self,
        channel_id: &ChannelId,
        preview: Option<LastMessagePreview>,
    ) -> Option<LastMessagePreview> {
        let slot = self.entries.get_mut(channel_id)?;
        std::mem::replace(&mut slot.entry.last_message_preview, preview)
    }

    /// Mark a channel read. Returns true if the count was non-zero.
    pub fn reset_to_zero(&mut self, channel_id: &ChannelId, at: DateTime<Utc>) -> bool {
        let slot = match self.entries.get_mut(channel_id) {
            Some(slot) => slot,
            None => match self.pending.get_mut(channel_id) {
                Some(slot) => slot,
                None => return false,
            },
        };
        let changed = slot.entry.unread_count != 0;
        slot.entry.unread_count = 0;
        slot.updated_at = slot.updated_at.max(at);
        changed
    }

    /// Restore an exact count, as captured before an optimistic change
    pub fn restore_count(&mut self, channel_id: &ChannelId, count: u32) {
        if let Some(slot) = self.entries.get_mut(channel_id) {
            slot.entry.unread_count = count;
        }
    }

    /// Full resynchronization from a fetch issued at `fetched_at`
    ///
    /// Each channel takes the server count unless it changed locally at or
    /// after `fetched_at`. Known channels missing from the snapshot and not
    /// touched since are reset to zero. Not for patching a single channel;
    /// use [`apply_delta`](Self::apply_delta) with [`UnreadDelta::Set`].
    pub fn bulk_replace(&mut self, incoming: Vec<UnreadEntry>, fetched_at: DateTime<Utc>) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        let mut present: HashSet<ChannelId> = HashSet::with_capacity(incoming.len());

        for server in incoming {
            present.insert(server.channel_id.clone());
            let slot = self.slot_mut(&server.channel_id);
            if slot.updated_at >= fetched_at {
                outcome.kept_local += 1;
            } else {
                slot.entry.unread_count = server.unread_count;
                slot.updated_at = fetched_at;
                outcome.replaced += 1;
            }
            slot.entry
                .record_last_message(server.last_message_preview, server.last_message_timestamp);
        }

        for (id, slot) in self.entries.iter_mut() {
            if present.contains(id) || slot.updated_at >= fetched_at {
                continue;
            }
            if slot.entry.unread_count != 0 {
                slot.entry.unread_count = 0;
                outcome.cleared += 1;
            }
            slot.updated_at = fetched_at;
        }

        debug!(
            "Unread resync: {} replaced, {} kept local, {} cleared",
            outcome.replaced, outcome.kept_local, outcome.cleared
        );
        outcome
    }

    fn slot_mut(&mut self, channel_id: &ChannelId) -> &mut Slot {
        let map = if self.known.contains(channel_id) {
            &mut self.entries
        } else {
            &mut self.pending
        };
        map.entry(channel_id.clone())
            .or_insert_with(|| Slot::empty(channel_id))
    }
}
