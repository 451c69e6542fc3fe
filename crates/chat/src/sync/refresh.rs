//! Applying a bulk channel snapshot

use chrono::{DateTime, Utc};
use log::info;
use std::collections::HashMap;

use super::ChatState;
use crate::backend::ChannelsResponse;
use crate::models::{ChannelId, LabelSet};
use crate::unread::BulkOutcome;

/// Statistics from applying one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub channels: usize,
    pub dm_channels: usize,
    /// Done overrides dropped because the server caught up
    pub settled_done: usize,
    /// Channels whose labels were healed to the server's set
    pub healed_labels: Vec<ChannelId>,
    /// Channels whose buffered unread state became visible
    pub surfaced_unread: Vec<ChannelId>,
    /// Present when the snapshot carried unread counts
    pub unread: Option<BulkOutcome>,
}

/// Fold a bulk snapshot into the state
///
/// `fetched_at` is when the fetch was issued, not when it returned. Anything
/// that changed locally after that instant wins over the snapshot.
pub fn apply_bulk_snapshot(state: &mut ChatState, response: ChannelsResponse, fetched_at: DateTime<Utc>) -> RefreshStats {
    let ChannelsResponse {
        channels,
        dm_channels,
        includes_labels,
        unread,
        labels,
    } = response;

    let mut stats = RefreshStats {
        channels: channels.len(),
        dm_channels: dm_channels.len(),
        ..Default::default()
    };

    let server_labels: Option<HashMap<ChannelId, LabelSet>> = includes_labels.then(|| {
        channels
            .iter()
            .chain(dm_channels.iter())
            .map(|r| (r.id.clone(), r.user_labels.clone()))
            .collect()
    });

    let fresh: Vec<_> = channels.iter().chain(dm_channels.iter()).cloned().collect();
    stats.settled_done = state.annotations.settle_done_overrides(&fresh);

    state
        .channels
        .apply_snapshot(&channels, &dm_channels, state.annotations.done_overrides(), fetched_at);

    stats.healed_labels = state
        .annotations
        .reconcile_labels(state.channels.records(), server_labels.as_ref());

    state.mirror_labels();

    let ids: Vec<ChannelId> = state.channels.ids().cloned().collect();
    stats.surfaced_unread = state.unread.sync_known_channels(ids);
    stats.unread = unread.map(|entries| {
        let entries = entries
            .into_iter()
            .map(|mut entry| {
                entry.last_message_preview = entry
                    .last_message_preview
                    .map(|p| state.channels.mask_retracted(&entry.channel_id, p));
                entry
            })
            .collect();
        state.unread.bulk_replace(entries, fetched_at)
    });

    if let Some(labels) = labels {
        state.annotations.set_catalog(labels);
    }

    info!(
        "Applied snapshot: {} channels, {} DMs, {} done settled, {} labels healed, {} unread surfaced",
        stats.channels,
        stats.dm_channels,
        stats.settled_done,
        stats.healed_labels.len(),
        stats.surfaced_unread.len()
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelRecord, Label, LabelId, UnreadEntry};
    use crate::unread::UnreadDelta;
    use chrono::{Duration, TimeZone};

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn response(labels: &[(&str, &str)], includes_labels: bool) -> ChannelsResponse {
        ChannelsResponse {
            channels: vec![
                ChannelRecord::group("c1", "General", t(0))
                    .with_labels(labels.iter().map(|(id, text)| Label::new(*id, *text)).collect()),
            ],
            dm_channels: vec![ChannelRecord::direct_message("d1", "bob", t(1))],
            includes_labels,
            unread: None,
            labels: None,
        }
    }

    #[test]
    fn test_labels_survive_refresh_without_label_info() {
        let mut state = ChatState::default();
        apply_bulk_snapshot(&mut state, response(&[("a", "A"), ("b", "B")], true), t(10));
        apply_bulk_snapshot(&mut state, response(&[], false), t(20));

        let c1 = ChannelId::new("c1");
        let labels = state.annotations.labels_for(&c1).unwrap();
        assert!(labels.contains(&LabelId::new("a")));
        assert!(labels.contains(&LabelId::new("b")));
        assert_eq!(&state.channels.get(&c1).unwrap().user_labels, labels);
    }

    #[test]
    fn test_buffered_unread_surfaces_on_refresh() {
        let mut state = ChatState::default();
        let d1 = ChannelId::new("d1");
        state.unread.apply_delta(
            &d1,
            UnreadDelta::Increment {
                preview: None,
                message_at: Some(t(2)),
                observed_at: t(2),
            },
        );

        let stats = apply_bulk_snapshot(&mut state, response(&[], false), t(1));
        assert_eq!(stats.surfaced_unread, vec![d1.clone()]);
        assert_eq!(state.unread.unread_count(&d1), 1);
    }

    #[test]
    fn test_newer_snapshot_replaces_counts() {
        let mut state = ChatState::default();
        apply_bulk_snapshot(&mut state, response(&[], false), t(0));

        let mut snapshot = response(&[], false);
        snapshot.unread = Some(vec![UnreadEntry::new("c1", 5)]);
        let stats = apply_bulk_snapshot(&mut state, snapshot, t(30));

        assert_eq!(stats.unread.unwrap().replaced, 1);
        assert_eq!(state.unread.unread_count(&ChannelId::new("c1")), 5);
    }

    #[test]
    fn test_catalog_taken_from_snapshot() {
        let mut state = ChatState::default();
        let mut snapshot = response(&[], false);
        snapshot.labels = Some(vec![Label::new("l1", "Work")]);
        apply_bulk_snapshot(&mut state, snapshot, t(0));
        assert_eq!(state.annotations.catalog(), vec![Label::new("l1", "Work")]);
    }
}
