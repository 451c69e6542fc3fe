//! Channel list queries

use serde::{Deserialize, Serialize};

use crate::merge::compare_activity;
use crate::models::{ChannelId, ChannelRecord, LabelId};
use crate::stream::MessageStreamPage;
use crate::sync::ChatState;

/// A channel as shown in a list row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    /// Record with overlay labels and the freshest preview applied
    pub record: ChannelRecord,
    pub unread_count: u32,
    pub is_pinned: bool,
    /// Row text derived from the preview; empty when there is none
    pub preview_text: String,
}

fn summarize(state: &ChatState, record: &ChannelRecord, preview_max_chars: usize) -> ChannelSummary {
    let mut record = record.clone();
    if let Some(labels) = state.annotations.labels_for(&record.id) {
        record.user_labels = labels.clone();
    }
    if let Some(is_done) = state.annotations.done_override(&record.id) {
        record.is_done = is_done;
    }

    let entry = state.unread.entry(&record.id);
    if let Some(entry) = entry {
        let ledger_newer = match (entry.last_message_timestamp, record.last_message_timestamp) {
            (Some(ledger), Some(list)) => ledger > list,
            (Some(_), None) => true,
            _ => false,
        };
        if ledger_newer && entry.last_message_preview.is_some() {
            record.last_message_preview = entry.last_message_preview.clone();
            record.last_message_timestamp = entry.last_message_timestamp;
        }
    }

    let preview_text = record
        .last_message_preview
        .as_ref()
        .map(|p| p.summary(preview_max_chars))
        .unwrap_or_default();

    ChannelSummary {
        is_pinned: state.annotations.is_pinned(&record.id),
        unread_count: entry.map_or(0, |e| e.unread_count),
        preview_text,
        record,
    }
}

/// All channels, most recent activity first
pub fn sorted_channel_list(state: &ChatState, preview_max_chars: usize) -> Vec<ChannelSummary> {
    let mut summaries: Vec<ChannelSummary> = state
        .channels
        .records()
        .iter()
        .map(|r| summarize(state, r, preview_max_chars))
        .collect();
    // The ledger may hold a newer preview than the list
    summaries.sort_by(|a, b| compare_activity(&a.record, &b.record));
    summaries
}

/// Sum of unread counts over listed channels accepted by `filter`
pub fn unread_total(state: &ChatState, filter: impl Fn(&ChannelRecord) -> bool) -> u64 {
    state.unread.total(|entry| {
        state
            .channels
            .get(&entry.channel_id)
            .is_some_and(|record| filter(record))
    })
}

pub fn message_stream<'a>(state: &'a ChatState, channel_id: &ChannelId) -> Option<&'a MessageStreamPage> {
    state.streams.page(channel_id)
}

/// Pinned channels in pin order; pins for unknown channels are skipped
pub fn pinned_channels(state: &ChatState, preview_max_chars: usize) -> Vec<ChannelSummary> {
    state
        .annotations
        .pins()
        .iter()
        .filter_map(|id| state.channels.get(id))
        .map(|r| summarize(state, r, preview_max_chars))
        .collect()
}

pub fn done_channels(state: &ChatState, preview_max_chars: usize) -> Vec<ChannelSummary> {
    sorted_channel_list(state, preview_max_chars)
        .into_iter()
        .filter(|s| s.record.is_done)
        .collect()
}

pub fn channels_with_label(state: &ChatState, label_id: &LabelId, preview_max_chars: usize) -> Vec<ChannelSummary> {
    sorted_channel_list(state, preview_max_chars)
        .into_iter()
        .filter(|s| s.record.user_labels.contains(label_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::DoneOverrides;
    use crate::models::{Label, LastMessagePreview, MessageType, UnreadEntry};
    use crate::unread::UnreadDelta;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn preview(text: &str) -> LastMessagePreview {
        LastMessagePreview {
            message_id: None,
            owner: "bob".to_string(),
            text: text.to_string(),
            message_type: MessageType::Text,
            is_bot_message: false,
            is_retracted: false,
        }
    }

    fn state() -> ChatState {
        let mut state = ChatState::default();
        let records = vec![
            ChannelRecord::group("a", "A", t(0)),
            ChannelRecord::group("b", "B", t(1)),
        ];
        let dms = vec![ChannelRecord::direct_message("d", "bob", t(2))];
        state.channels.apply_snapshot(&records, &dms, &DoneOverrides::new(), t(3));
        state.unread.sync_known_channels(state.channels.ids().cloned().collect::<Vec<_>>());
        state.annotations.reconcile_labels(state.channels.records(), None);
        state
    }

    #[test]
    fn test_ledger_preview_reorders_list() {
        let mut state = state();
        state.unread.apply_delta(
            &ChannelId::new("a"),
            UnreadDelta::Increment {
                preview: Some(preview("newest message here")),
                message_at: Some(t(10)),
                observed_at: t(10),
            },
        );

        let list = sorted_channel_list(&state, 10);
        assert_eq!(list[0].record.id.as_str(), "a");
        assert_eq!(list[0].unread_count, 1);
        assert_eq!(list[0].preview_text, "newest mes...");
        assert_eq!(list[1].record.id.as_str(), "d");
    }

    #[test]
    fn test_unread_total_with_filter() {
        let mut state = state();
        state.unread.bulk_replace(
            vec![UnreadEntry::new("a", 2), UnreadEntry::new("d", 3)],
            t(5),
        );
        assert_eq!(unread_total(&state, |_| true), 5);
        assert_eq!(unread_total(&state, |r| r.is_direct_message()), 3);
    }

    #[test]
    fn test_pinned_in_pin_order() {
        let mut state = state();
        state.annotations.toggle_pin(&ChannelId::new("a"));
        state.annotations.toggle_pin(&ChannelId::new("ghost"));
        state.annotations.toggle_pin(&ChannelId::new("d"));

        let ids: Vec<String> = pinned_channels(&state, 10)
            .into_iter()
            .map(|s| s.record.id.0)
            .collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn test_overlays_joined_at_read_time() {
        let mut state = state();
        state.annotations.add_label(&ChannelId::new("b"), Label::new("l1", "Work"));
        state.annotations.set_done(&ChannelId::new("a"), true);

        let labelled = channels_with_label(&state, &LabelId::new("l1"), 10);
        assert_eq!(labelled.len(), 1);
        assert_eq!(labelled[0].record.id.as_str(), "b");

        let done = done_channels(&state, 10);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].record.id.as_str(), "a");
    }
}
