//! Integration tests for the chat crate
//!
//! These drive [`ChatSync`] end to end against a scripted backend: bulk
//! refreshes, push events and optimistic actions interleaved.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chat::{
    ActionKind, BackendError, Begun, Change, ChangeListener, ChannelId, ChannelRecord, ChannelsResponse,
    ChatBackend, ChatSync, Dispatch, FetchedMessages, InMemoryKeyValueStore, KeyValueStore, Label, LabelId,
    LabelSet, LastMessagePreview, MessageId, MessageType, PageCursor, Settled, SqliteKeyValueStore,
    StreamMessage, SyncConfig, UnreadEntry,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

/// Backend that replays scripted responses and records every call
#[derive(Default)]
struct ScriptedBackend {
    snapshots: Mutex<VecDeque<ChannelsResponse>>,
    pages: Mutex<VecDeque<FetchedMessages>>,
    failures: Mutex<HashMap<&'static str, BackendError>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn push_snapshot(&self, response: ChannelsResponse) {
        self.snapshots.lock().unwrap().push_back(response);
    }

    fn push_page(&self, page: FetchedMessages) {
        self.pages.lock().unwrap().push_back(page);
    }

    fn fail_next(&self, call: &'static str, error: BackendError) {
        self.failures.lock().unwrap().insert(call, error);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(call.to_string());
        match self.failures.lock().unwrap().remove(call) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ChatBackend for ScriptedBackend {
    fn list_channels(&self) -> Result<ChannelsResponse, BackendError> {
        self.record("list_channels")?;
        self.snapshots
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BackendError::network("no snapshot scripted"))
    }

    fn fetch_unread_count(&self, _channel_id: &ChannelId) -> Result<u32, BackendError> {
        self.record("fetch_unread_count")?;
        Ok(0)
    }

    fn fetch_messages(
        &self,
        _channel_id: &ChannelId,
        _cursor: &PageCursor,
        _limit: usize,
    ) -> Result<FetchedMessages, BackendError> {
        self.record("fetch_messages")?;
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn retract_message(&self, _channel_id: &ChannelId, _message_id: &MessageId) -> Result<(), BackendError> {
        self.record("retract_message")
    }

    fn set_channel_done(&self, _channel_id: &ChannelId, _is_done: bool) -> Result<(), BackendError> {
        self.record("set_channel_done")
    }

    fn add_channel_label(&self, _channel_id: &ChannelId, _label: &Label) -> Result<(), BackendError> {
        self.record("add_channel_label")
    }

    fn remove_channel_label(&self, _channel_id: &ChannelId, _label_id: &LabelId) -> Result<(), BackendError> {
        self.record("remove_channel_label")
    }

    fn rename_channel(&self, _channel_id: &ChannelId, _display_name: &str) -> Result<(), BackendError> {
        self.record("rename_channel")
    }

    fn rename_label(&self, _label_id: &LabelId, _label_text: &str) -> Result<(), BackendError> {
        self.record("rename_label")
    }

    fn delete_label(&self, _label_id: &LabelId) -> Result<(), BackendError> {
        self.record("delete_label")
    }
}

/// Listener that keeps every change it is told about
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Change>>,
}

impl ChangeListener for Recorder {
    fn on_change(&self, change: &Change) {
        self.seen.lock().unwrap().push(change.clone());
    }
}

fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
}

fn group(id: &str) -> ChannelRecord {
    ChannelRecord::group(id, format!("Channel {id}"), t(0))
}

fn snapshot(records: Vec<ChannelRecord>, unread: &[(&str, u32)]) -> ChannelsResponse {
    ChannelsResponse {
        channels: records,
        unread: Some(unread.iter().map(|(id, n)| UnreadEntry::new(*id, *n)).collect()),
        ..Default::default()
    }
}

fn setup() -> (Arc<ScriptedBackend>, ChatSync) {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = Arc::new(ScriptedBackend::default());
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
    let sync = ChatSync::new(backend.clone(), store, "me", SyncConfig::default());
    (backend, sync)
}

fn created(channel: &str, message: &str, owner: &str) -> serde_json::Value {
    json!({"channel_id": channel, "message_id": message, "owner": owner, "text": "hi there"})
}

#[test]
fn test_newer_snapshot_overrides_local_increments() {
    let (_, mut sync) = setup();
    let c1 = ChannelId::new("c1");

    sync.apply_snapshot(snapshot(vec![group("c1")], &[("c1", 0)]), t(0));
    sync.focus_channel_at(Some(ChannelId::new("c2")), t(1));

    for (i, id) in ["m1", "m2", "m3"].iter().enumerate() {
        let dispatch = sync.handle_event_at("message_created", &created("c1", id, "bob"), t(10 + i as i64));
        assert!(matches!(dispatch, Dispatch::Applied(_)));
    }
    assert_eq!(sync.unread_count(&c1), 3);

    sync.apply_snapshot(snapshot(vec![group("c1")], &[("c1", 5)]), t(20));
    assert_eq!(sync.unread_count(&c1), 5);
    assert_eq!(sync.unread_total(|_| true), 5);
}

#[test]
fn test_stale_snapshot_keeps_local_count() {
    let (_, mut sync) = setup();
    let c1 = ChannelId::new("c1");

    sync.apply_snapshot(snapshot(vec![group("c1")], &[("c1", 0)]), t(0));
    sync.handle_event_at("message_created", &created("c1", "m1", "bob"), t(10));
    sync.handle_event_at("message_created", &created("c1", "m2", "bob"), t(11));

    // Issued before the second increment was observed
    sync.apply_snapshot(snapshot(vec![group("c1")], &[("c1", 1)]), t(10));
    assert_eq!(sync.unread_count(&c1), 2);
}

#[test]
fn test_focus_reset_is_not_undone_by_older_snapshot() {
    let (_, mut sync) = setup();
    let c1 = ChannelId::new("c1");

    sync.apply_snapshot(snapshot(vec![group("c1")], &[("c1", 4)]), t(0));
    assert_eq!(sync.unread_count(&c1), 4);

    sync.focus_channel_at(Some(c1.clone()), t(5));
    assert_eq!(sync.unread_count(&c1), 0);

    sync.handle_event_at("message_created", &created("c1", "m1", "bob"), t(6));
    assert_eq!(sync.unread_count(&c1), 0);

    sync.apply_snapshot(snapshot(vec![group("c1")], &[("c1", 4)]), t(3));
    assert_eq!(sync.unread_count(&c1), 0);
}

#[test]
fn test_unread_for_unknown_channel_surfaces_on_refresh() {
    let (_, mut sync) = setup();
    let c9 = ChannelId::new("c9");

    sync.apply_snapshot(snapshot(vec![group("c1")], &[]), t(0));
    sync.handle_event_at("message_created", &created("c9", "m1", "bob"), t(10));
    assert!(sync.sorted_channel_list().iter().all(|s| s.record.id != c9));

    let stats = sync.apply_snapshot(
        ChannelsResponse {
            channels: vec![group("c1"), group("c9")],
            ..Default::default()
        },
        t(5),
    );
    assert_eq!(stats.surfaced_unread, vec![c9.clone()]);
    assert_eq!(sync.unread_count(&c9), 1);
}

#[test]
fn test_retraction_places_placeholder_without_open_stream() {
    let (_, mut sync) = setup();
    let c1 = ChannelId::new("c1");

    sync.apply_snapshot(snapshot(vec![group("c1")], &[("c1", 0)]), t(0));
    sync.handle_event_at("message_created", &created("c1", "m9", "bob"), t(10));
    assert!(sync.message_stream(&c1).is_none());

    let dispatch = sync.handle_event_at(
        "message_retracted",
        &json!({"channel_id": "c1", "message_id": "m9", "is_last_message": 1, "owner": "bob"}),
        t(11),
    );
    assert!(dispatch.changes().contains(&Change::ChannelList));

    let summary = sync.sorted_channel_list().into_iter().find(|s| s.record.id == c1).unwrap();
    assert_eq!(summary.preview_text, "Message retracted");
}

#[test]
fn test_snapshot_issued_before_retraction_keeps_placeholder() {
    let (_, mut sync) = setup();
    let c1 = ChannelId::new("c1");

    sync.apply_snapshot(snapshot(vec![group("c1")], &[("c1", 0)]), t(0));
    sync.handle_event_at(
        "message_created",
        &json!({"channel_id": "c1", "message_id": "m9", "owner": "bob", "text": "secret", "timestamp": t(10)}),
        t(10),
    );

    // Fetch issued at t(11) still sees m9 as a plain message
    let plain = LastMessagePreview {
        message_id: Some(MessageId::new("m9")),
        owner: "bob".to_string(),
        text: "secret".to_string(),
        message_type: MessageType::Text,
        is_bot_message: false,
        is_retracted: false,
    };
    let mut entry = UnreadEntry::new("c1", 1);
    entry.last_message_preview = Some(plain.clone());
    entry.last_message_timestamp = Some(t(10));
    let stale = ChannelsResponse {
        channels: vec![group("c1").with_last_message(plain, t(10))],
        unread: Some(vec![entry]),
        ..Default::default()
    };

    sync.handle_event_at(
        "message_retracted",
        &json!({"channel_id": "c1", "message_id": "m9", "is_last_message": 1, "owner": "bob"}),
        t(12),
    );
    let row = |sync: &ChatSync| sync.sorted_channel_list().into_iter().find(|s| s.record.id == c1).unwrap();
    assert_eq!(row(&sync).preview_text, "Message retracted");

    sync.apply_snapshot(stale, t(11));
    assert_eq!(row(&sync).preview_text, "Message retracted");
    let ledger_preview = sync.state().unread().entry(&c1).unwrap().last_message_preview.clone().unwrap();
    assert!(ledger_preview.is_retracted);
}

#[test]
fn test_duplicate_delete_is_suppressed() {
    let (backend, mut sync) = setup();
    let c1 = ChannelId::new("c1");

    sync.apply_snapshot(snapshot(vec![group("c1")], &[]), t(0));
    backend.push_page(FetchedMessages {
        messages: ["m1", "m2", "m3"]
            .iter()
            .enumerate()
            .map(|(i, id)| {
                StreamMessage::builder(MessageId::new(*id), c1.clone())
                    .owner("bob")
                    .text("hello")
                    .created_at(t(i as i64))
                    .build()
            })
            .collect(),
        has_more: false,
    });
    sync.open_stream(&c1).unwrap();
    assert_eq!(sync.message_stream(&c1).unwrap().len(), 3);

    let payload = json!({"channel_id": "c1", "message_id": "m2"});
    assert!(matches!(sync.handle_event_at("message_deleted", &payload, t(100)), Dispatch::Applied(_)));
    assert!(matches!(
        sync.handle_event_at("raven:message_deleted", &payload, t(100) + Duration::milliseconds(300)),
        Dispatch::Duplicate
    ));
    assert_eq!(sync.message_stream(&c1).unwrap().len(), 2);
}

#[test]
fn test_malformed_event_is_dropped() {
    let (_, mut sync) = setup();
    sync.apply_snapshot(snapshot(vec![group("c1")], &[("c1", 0)]), t(0));

    let dispatch = sync.handle_event_at("message_reacted", &json!({"channel_id": "c1"}), t(1));
    assert!(matches!(dispatch, Dispatch::Dropped(_)));
    let dispatch = sync.handle_event_at("typing_started", &json!({"channel_id": "c1"}), t(1));
    assert!(matches!(dispatch, Dispatch::Dropped(_)));
}

#[test]
fn test_failed_label_add_restores_exact_state() {
    let (backend, mut sync) = setup();
    let recorder = Arc::new(Recorder::default());
    sync.subscribe(recorder.clone());

    let c1 = ChannelId::new("c1");
    let urgent = Label::new("l1", "Urgent");
    let later = Label::new("l2", "Later");

    let record = group("c1").with_labels([urgent.clone()].into_iter().collect());
    sync.apply_snapshot(
        ChannelsResponse {
            channels: vec![record],
            includes_labels: true,
            labels: Some(vec![urgent.clone()]),
            ..Default::default()
        },
        t(0),
    );
    let labels_before = sync.state().annotations().labels_for(&c1).cloned();
    let catalog_before = sync.labels();

    backend.fail_next("add_channel_label", BackendError::rejected("label limit reached"));
    let settled = sync.add_label(&c1, later);

    let failure = settled.failure().cloned().unwrap();
    assert!(matches!(settled, Settled::RolledBack(..)));
    assert_eq!(failure.to_string(), "Add label \"Later\" failed: label limit reached");
    assert_eq!(sync.state().annotations().labels_for(&c1).cloned(), labels_before);
    assert_eq!(sync.labels(), catalog_before);

    let seen = recorder.seen.lock().unwrap();
    assert!(seen.contains(&Change::ActionFailed(failure)));
}

#[test]
fn test_pending_label_add_shows_in_list_and_yields_to_rename() {
    let (_backend, mut sync) = setup();
    let c1 = ChannelId::new("c1");
    let l1 = LabelId::new("l1");
    sync.apply_snapshot(snapshot(vec![group("c1")], &[]), t(0));

    let kind = ActionKind::AddLabel {
        channel_id: c1.clone(),
        label: Label::new("l1", "Work"),
    };
    let Begun::Pending(add_id, _) = sync.begin(kind) else {
        panic!("add should wait for confirmation");
    };
    let record = sync.state().channels().get(&c1).unwrap();
    assert!(record.user_labels.contains(&l1));

    let renamed = sync.perform(ActionKind::RenameLabel {
        label_id: l1.clone(),
        label_text: "Office".to_string(),
    });
    assert!(matches!(renamed, Settled::Committed));

    let settled = sync.settle(add_id, Err(BackendError::rejected("label limit reached")));
    assert!(matches!(settled, Settled::RolledBack(..)));
    assert_eq!(sync.labels(), vec![Label::new("l1", "Office")]);
    assert!(!sync.state().annotations().labels_for(&c1).is_some_and(|set| set.contains(&l1)));
    let record = sync.state().channels().get(&c1).unwrap();
    assert!(!record.user_labels.contains(&l1));
}

#[test]
fn test_local_labels_survive_refresh_until_healed() {
    let (_, mut sync) = setup();
    let c1 = ChannelId::new("c1");
    let urgent = Label::new("l1", "Urgent");

    sync.apply_snapshot(snapshot(vec![group("c1")], &[]), t(0));
    assert!(matches!(sync.add_label(&c1, urgent.clone()), Settled::Committed));

    // A refresh without label data leaves the overlay alone
    sync.apply_snapshot(snapshot(vec![group("c1")], &[]), t(10));
    let tagged = sync.channels_with_label(&urgent.label_id);
    assert_eq!(tagged.len(), 1);
    assert!(tagged[0].record.user_labels.contains(&urgent.label_id));

    // One disagreeing refresh is tolerated, the next one heals
    let without_labels = ChannelsResponse {
        channels: vec![group("c1").with_labels(LabelSet::new())],
        includes_labels: true,
        ..Default::default()
    };
    let stats = sync.apply_snapshot(without_labels.clone(), t(20));
    assert!(stats.healed_labels.is_empty());
    assert_eq!(sync.channels_with_label(&urgent.label_id).len(), 1);

    let stats = sync.apply_snapshot(without_labels, t(30));
    assert_eq!(stats.healed_labels, vec![c1]);
    assert!(sync.channels_with_label(&urgent.label_id).is_empty());
}

#[test]
fn test_done_override_outlives_lagging_snapshot() {
    let (backend, mut sync) = setup();
    let c1 = ChannelId::new("c1");

    sync.apply_snapshot(snapshot(vec![group("c1")], &[]), t(0));
    assert!(matches!(sync.set_done(&c1, true), Settled::Committed));
    assert_eq!(backend.calls(), vec!["set_channel_done"]);

    sync.apply_snapshot(snapshot(vec![group("c1").with_done(false)], &[]), t(10));
    assert_eq!(sync.done_channels().len(), 1);

    let stats = sync.apply_snapshot(snapshot(vec![group("c1").with_done(true)], &[]), t(20));
    assert_eq!(stats.settled_done, 1);
    assert!(sync.done_channels()[0].record.is_done);
}

#[test]
fn test_pins_persist_in_sqlite_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chat.db");
    let backend = Arc::new(ScriptedBackend::default());
    let c1 = ChannelId::new("c1");
    let c2 = ChannelId::new("c2");

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(&path).unwrap());
        let mut sync = ChatSync::new(backend.clone(), store, "me", SyncConfig::default());
        assert!(sync.toggle_pin(&c2));
        assert!(sync.toggle_pin(&c1));
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(&path).unwrap());
    let mut sync = ChatSync::new(backend.clone(), store, "me", SyncConfig::default());
    sync.apply_snapshot(snapshot(vec![group("c1"), group("c2")], &[]), t(0));

    let pinned: Vec<ChannelId> = sync.pinned_channels().into_iter().map(|s| s.record.id).collect();
    assert_eq!(pinned, vec![c2, c1]);
    // Pins never reach the server
    assert!(backend.calls().is_empty());
}

#[test]
fn test_refresh_failure_keeps_state() {
    let (backend, mut sync) = setup();
    backend.push_snapshot(snapshot(vec![group("c1"), group("c2")], &[("c1", 2)]));

    let stats = sync.refresh().unwrap();
    assert_eq!(stats.channels, 2);

    let err = sync.refresh().unwrap_err();
    assert!(err.is_transient());
    assert_eq!(sync.sorted_channel_list().len(), 2);
    assert_eq!(sync.unread_count(&ChannelId::new("c1")), 2);
}

#[test]
fn test_refresh_respects_cooldown() {
    let (backend, mut sync) = setup();
    backend.push_snapshot(snapshot(vec![group("c1")], &[]));
    backend.push_snapshot(snapshot(vec![group("c1")], &[]));

    let now = Utc::now();
    assert!(sync.refresh_if_due(now).unwrap().is_some());
    assert!(sync.refresh_if_due(now + Duration::seconds(5)).unwrap().is_none());
    assert!(sync.refresh_if_due(now + Duration::seconds(60)).unwrap().is_some());
    assert_eq!(backend.calls().len(), 2);
}

#[test]
fn test_observers_hear_event_changes() {
    let (_, mut sync) = setup();
    let recorder = Arc::new(Recorder::default());
    let id = sync.subscribe(recorder.clone());

    sync.apply_snapshot(snapshot(vec![group("c1")], &[]), t(0));
    recorder.seen.lock().unwrap().clear();

    sync.handle_event_at("message_created", &created("c1", "m1", "bob"), t(10));
    {
        let seen = recorder.seen.lock().unwrap();
        assert!(seen.contains(&Change::Unread));
        assert!(seen.contains(&Change::ChannelList));
    }

    assert!(sync.unsubscribe(id));
    recorder.seen.lock().unwrap().clear();
    sync.handle_event_at("message_created", &created("c1", "m2", "bob"), t(11));
    assert!(recorder.seen.lock().unwrap().is_empty());
}

#[test]
fn test_member_removed_drops_channel_everywhere() {
    let (_, mut sync) = setup();
    let c1 = ChannelId::new("c1");

    sync.apply_snapshot(snapshot(vec![group("c1"), group("c2")], &[("c1", 3)]), t(0));
    sync.toggle_pin(&c1);

    sync.handle_event_at("member_removed", &json!({"channel_id": "c1", "removed_user": "someone"}), t(5));
    assert_eq!(sync.sorted_channel_list().len(), 2);

    sync.handle_event_at("member_removed", &json!({"channel_id": "c1", "removed_user": "me"}), t(6));
    assert_eq!(sync.sorted_channel_list().len(), 1);
    assert_eq!(sync.unread_count(&c1), 0);
    assert!(sync.pinned_channels().is_empty());
}
