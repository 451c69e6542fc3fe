//! Pure channel-list reconciliation

use log::warn;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::{ChannelId, ChannelKind, ChannelRecord};

/// Most recent local done/undone decision per channel
pub type DoneOverrides = HashMap<ChannelId, bool>;

/// Order by activity descending, then id ascending
pub fn compare_activity(a: &ChannelRecord, b: &ChannelRecord) -> Ordering {
    b.activity_at()
        .cmp(&a.activity_at())
        .then_with(|| a.id.cmp(&b.id))
}

/// Merge a fresh snapshot with the previously held list
///
/// Server-authoritative fields come from the fresh records. Client-local
/// fields (`user_labels`) are carried over from `previous` when the channel
/// was already known. `is_done` resolves as override, then fresh value.
///
/// Channels absent from the snapshot are dropped. The output is sorted by
/// [`compare_activity`] and holds each id once. The function is idempotent:
/// feeding its own output back as `previous` yields the same list.
pub fn merge_channels(
    fresh_channels: &[ChannelRecord],
    fresh_dms: &[ChannelRecord],
    done_overrides: &DoneOverrides,
    previous: &[ChannelRecord],
) -> Vec<ChannelRecord> {
    let previous_by_id: HashMap<&ChannelId, &ChannelRecord> =
        previous.iter().map(|r| (&r.id, r)).collect();

    let tagged = fresh_channels
        .iter()
        .map(|r| (r, ChannelKind::Group))
        .chain(fresh_dms.iter().map(|r| (r, ChannelKind::DirectMessage)));

    let mut seen: HashSet<&ChannelId> = HashSet::new();
    let mut merged = Vec::with_capacity(fresh_channels.len() + fresh_dms.len());

    for (fresh, kind) in tagged {
        if !seen.insert(&fresh.id) {
            warn!("Duplicate channel {} in snapshot, keeping first", fresh.id);
            continue;
        }

        let mut record = fresh.clone();
        record.kind = kind;
        if kind == ChannelKind::Group {
            record.peer_user_id = None;
        }

        if let Some(prev) = previous_by_id.get(&fresh.id) {
            record.user_labels = prev.user_labels.clone();
        }

        if let Some(&done) = done_overrides.get(&fresh.id) {
            record.is_done = done;
        }

        merged.push(record);
    }

    merged.sort_by(compare_activity);
    merged
}
