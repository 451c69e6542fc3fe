//! Annotation store implementation

use log::{debug, info};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::PinnedSet;
use crate::merge::DoneOverrides;
use crate::models::{ChannelId, ChannelRecord, Label, LabelId, LabelSet};

/// Target of a label removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelScope {
    Channel(ChannelId),
    /// Every channel; used when the label itself is deleted
    AllChannels,
}

/// Client-local overlays on top of the channel list
///
/// Every mutation is synchronous and immediately visible. Server calls for
/// these changes are issued by the action coordinator, not here.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    catalog: BTreeMap<LabelId, String>,
    labels: HashMap<ChannelId, LabelSet>,
    done_overrides: DoneOverrides,
    pins: PinnedSet,
    /// Consecutive refreshes in which the server's label set differed
    disagreements: HashMap<ChannelId, u32>,
    heal_after_cycles: u32,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new(1)
    }
}

impl AnnotationStore {
    /// `heal_after_cycles`: disagreeing refreshes tolerated before the
    /// server's label set replaces the local one
    pub fn new(heal_after_cycles: u32) -> Self {
        Self {
            catalog: BTreeMap::new(),
            labels: HashMap::new(),
            done_overrides: DoneOverrides::new(),
            pins: PinnedSet::new(),
            disagreements: HashMap::new(),
            heal_after_cycles,
        }
    }

    // === Labels ===

    /// Known label documents, ordered by id
    pub fn catalog(&self) -> Vec<Label> {
        self.catalog
            .iter()
            .map(|(id, text)| Label::new(id.clone(), text.clone()))
            .collect()
    }

    pub fn catalog_label(&self, label_id: &LabelId) -> Option<Label> {
        self.catalog
            .get(label_id)
            .map(|text| Label::new(label_id.clone(), text.clone()))
    }

    /// Create or replace a label document
    pub fn upsert_label(&mut self, label: Label) {
        self.catalog.insert(label.label_id, label.label_text);
    }

    /// Replace the catalog with a fetched list of label documents
    pub fn set_catalog(&mut self, labels: Vec<Label>) {
        self.catalog = labels
            .into_iter()
            .map(|l| (l.label_id, l.label_text))
            .collect();
    }

    pub fn labels_for(&self, channel_id: &ChannelId) -> Option<&LabelSet> {
        self.labels.get(channel_id)
    }

    pub fn channel_label(&self, channel_id: &ChannelId, label_id: &LabelId) -> Option<Label> {
        self.labels.get(channel_id)?.get(label_id)
    }

    /// Channels carrying `label_id`
    pub fn channels_with_label(&self, label_id: &LabelId) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self
            .labels
            .iter()
            .filter(|(_, set)| set.contains(label_id))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Attach a label to a channel. Returns true if it was not attached yet.
    pub fn add_label(&mut self, channel_id: &ChannelId, label: Label) -> bool {
        self.catalog
            .entry(label.label_id.clone())
            .or_insert_with(|| label.label_text.clone());
        self.labels
            .entry(channel_id.clone())
            .or_default()
            .insert(label)
    }

    /// Detach a label, returning every `(channel, label)` pair removed
    pub fn remove_label(&mut self, scope: LabelScope, label_id: &LabelId) -> Vec<(ChannelId, Label)> {
        let mut removed = Vec::new();
        match scope {
            LabelScope::Channel(channel_id) => {
                if let Some(label) = self
                    .labels
                    .get_mut(&channel_id)
                    .and_then(|set| set.remove(label_id))
                {
                    removed.push((channel_id, label));
                }
            }
            LabelScope::AllChannels => {
                for (channel_id, set) in self.labels.iter_mut() {
                    if let Some(label) = set.remove(label_id) {
                        removed.push((channel_id.clone(), label));
                    }
                }
                removed.sort_by(|a, b| a.0.cmp(&b.0));
            }
        }
        removed
    }

    /// Rename a label everywhere, returning the previous catalog text
    pub fn rename_label(&mut self, label_id: &LabelId, text: &str) -> Option<String> {
        let previous = self.catalog.insert(label_id.clone(), text.to_string());
        for set in self.labels.values_mut() {
            set.rename(label_id, text);
        }
        previous
    }

    /// Delete a label document and detach it from every channel
    pub fn delete_label(&mut self, label_id: &LabelId) -> (Option<Label>, Vec<(ChannelId, Label)>) {
        let definition = self
            .catalog
            .remove(label_id)
            .map(|text| Label::new(label_id.clone(), text));
        let detached = self.remove_label(LabelScope::AllChannels, label_id);
        (definition, detached)
    }

    /// Put one channel's label back as captured: `None` means absent
    pub fn restore_channel_label(&mut self, channel_id: &ChannelId, label_id: &LabelId, label: Option<Label>) {
        match label {
            Some(label) => {
                self.labels.entry(channel_id.clone()).or_default().insert(label);
            }
            None => {
                if let Some(set) = self.labels.get_mut(channel_id) {
                    set.remove(label_id);
                }
            }
        }
    }

    /// Put a label definition and its assignments back as captured
    pub fn restore_label_definition(
        &mut self,
        label_id: &LabelId,
        definition: Option<Label>,
        assignments: Vec<(ChannelId, Label)>,
    ) {
        match definition {
            Some(label) => {
                self.catalog.insert(label.label_id, label.label_text);
            }
            None => {
                self.catalog.remove(label_id);
            }
        }
        for (channel_id, label) in assignments {
            self.labels.entry(channel_id).or_default().insert(label);
        }
    }

    /// Reconcile overlays after a refresh
    ///
    /// Channels seen for the first time take the merged record's labels.
    /// When the server reported label sets, a channel whose set keeps
    /// disagreeing for more than `heal_after_cycles` refreshes is healed to
    /// the server's set. Returns the healed channel ids.
    pub fn reconcile_labels(
        &mut self,
        merged: &[ChannelRecord],
        server_labels: Option<&HashMap<ChannelId, LabelSet>>,
    ) -> Vec<ChannelId> {
        let live: HashSet<&ChannelId> = merged.iter().map(|r| &r.id).collect();
        self.labels.retain(|id, _| live.contains(id));
        self.disagreements.retain(|id, _| live.contains(id));

        for record in merged {
            self.labels
                .entry(record.id.clone())
                .or_insert_with(|| record.user_labels.clone());
        }

        let Some(server_labels) = server_labels else {
            return Vec::new();
        };

        let mut healed = Vec::new();
        for record in merged {
            let server = server_labels.get(&record.id).cloned().unwrap_or_default();
            let local = self.labels.entry(record.id.clone()).or_default();
            if *local == server {
                self.disagreements.remove(&record.id);
                continue;
            }

            let count = self.disagreements.entry(record.id.clone()).or_insert(0);
            *count += 1;
            if *count > self.heal_after_cycles {
                info!("Healing labels on {} to the server's set", record.id);
                *local = server;
                self.disagreements.remove(&record.id);
                healed.push(record.id.clone());
            } else {
                debug!("Labels on {} disagree with server ({} cycle(s))", record.id, count);
            }
        }
        healed.sort();
        healed
    }

    // === Done flags ===

    pub fn done_overrides(&self) -> &DoneOverrides {
        &self.done_overrides
    }

    pub fn done_override(&self, channel_id: &ChannelId) -> Option<bool> {
        self.done_overrides.get(channel_id).copied()
    }

    /// Record a local done decision, returning the previous override
    pub fn set_done(&mut self, channel_id: &ChannelId, is_done: bool) -> Option<bool> {
        self.done_overrides.insert(channel_id.clone(), is_done)
    }

    /// Put an override back as captured: `None` means no override
    pub fn restore_done(&mut self, channel_id: &ChannelId, previous: Option<bool>) {
        match previous {
            Some(done) => {
                self.done_overrides.insert(channel_id.clone(), done);
            }
            None => {
                self.done_overrides.remove(channel_id);
            }
        }
    }

    /// Drop overrides the server has caught up with
    pub fn settle_done_overrides(&mut self, fresh: &[ChannelRecord]) -> usize {
        let before = self.done_overrides.len();
        for record in fresh {
            if self.done_overrides.get(&record.id) == Some(&record.is_done) {
                self.done_overrides.remove(&record.id);
            }
        }
        before - self.done_overrides.len()
    }

    // === Pins ===

    pub fn pins(&self) -> &PinnedSet {
        &self.pins
    }

    pub fn is_pinned(&self, channel_id: &ChannelId) -> bool {
        self.pins.contains(channel_id)
    }

    /// Returns the new pinned state
    pub fn toggle_pin(&mut self, channel_id: &ChannelId) -> bool {
        self.pins.toggle(channel_id)
    }

    pub fn replace_pins(&mut self, pins: PinnedSet) {
        self.pins = pins;
    }

    /// Drop label and done state for a channel the user lost access to
    ///
    /// Pins are a device preference and are kept.
    pub fn forget_channel(&mut self, channel_id: &ChannelId) {
        self.labels.remove(channel_id);
        self.done_overrides.remove(channel_id);
        self.disagreements.remove(channel_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, labels: &[(&str, &str)]) -> ChannelRecord {
        ChannelRecord::group(id, id, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .with_labels(labels.iter().map(|(id, text)| Label::new(*id, *text)).collect())
    }

    fn set(labels: &[(&str, &str)]) -> LabelSet {
        labels.iter().map(|(id, text)| Label::new(*id, *text)).collect()
    }

    #[test]
    fn test_wildcard_remove_touches_every_channel() {
        let mut store = AnnotationStore::default();
        let (a, b) = (ChannelId::new("a"), ChannelId::new("b"));
        store.add_label(&a, Label::new("l1", "Work"));
        store.add_label(&b, Label::new("l1", "Work"));
        store.add_label(&b, Label::new("l2", "Home"));

        let removed = store.remove_label(LabelScope::AllChannels, &LabelId::new("l1"));
        assert_eq!(removed.len(), 2);
        assert!(store.labels_for(&a).unwrap().is_empty());
        assert_eq!(store.labels_for(&b).unwrap(), &set(&[("l2", "Home")]));
    }

    #[test]
    fn test_rename_updates_catalog_and_channels() {
        let mut store = AnnotationStore::default();
        let a = ChannelId::new("a");
        store.add_label(&a, Label::new("l1", "Work"));

        let previous = store.rename_label(&LabelId::new("l1"), "Office");
        assert_eq!(previous.as_deref(), Some("Work"));
        assert_eq!(store.catalog(), vec![Label::new("l1", "Office")]);
        assert_eq!(store.labels_for(&a).unwrap(), &set(&[("l1", "Office")]));
    }

    #[test]
    fn test_delete_and_restore_label_definition() {
        let mut store = AnnotationStore::default();
        let a = ChannelId::new("a");
        store.add_label(&a, Label::new("l1", "Work"));
        let before = store.clone();

        let (definition, detached) = store.delete_label(&LabelId::new("l1"));
        assert!(store.catalog().is_empty());
        assert!(store.channels_with_label(&LabelId::new("l1")).is_empty());

        store.restore_label_definition(&LabelId::new("l1"), definition, detached);
        assert_eq!(store.catalog(), before.catalog());
        assert_eq!(store.labels_for(&a), before.labels_for(&a));
    }

    #[test]
    fn test_first_refresh_seeds_overlay() {
        let mut store = AnnotationStore::default();
        store.reconcile_labels(&[record("a", &[("l1", "Work")])], None);
        assert_eq!(store.labels_for(&ChannelId::new("a")).unwrap(), &set(&[("l1", "Work")]));
    }

    #[test]
    fn test_one_stale_read_is_tolerated_then_healed() {
        let mut store = AnnotationStore::new(1);
        let a = ChannelId::new("a");
        let merged = vec![record("a", &[])];
        store.reconcile_labels(&merged, None);
        store.add_label(&a, Label::new("l1", "Work"));

        let server: HashMap<ChannelId, LabelSet> = HashMap::from([(a.clone(), LabelSet::new())]);

        assert!(store.reconcile_labels(&merged, Some(&server)).is_empty());
        assert!(store.labels_for(&a).unwrap().contains(&LabelId::new("l1")));

        assert_eq!(store.reconcile_labels(&merged, Some(&server)), vec![a.clone()]);
        assert!(store.labels_for(&a).unwrap().is_empty());
    }

    #[test]
    fn test_agreement_resets_disagreement_count() {
        let mut store = AnnotationStore::new(1);
        let a = ChannelId::new("a");
        let merged = vec![record("a", &[])];
        store.reconcile_labels(&merged, None);
        store.add_label(&a, Label::new("l1", "Work"));

        let lagging = HashMap::from([(a.clone(), LabelSet::new())]);
        let caught_up = HashMap::from([(a.clone(), set(&[("l1", "Work")]))]);

        store.reconcile_labels(&merged, Some(&lagging));
        store.reconcile_labels(&merged, Some(&caught_up));
        store.reconcile_labels(&merged, Some(&lagging));
        assert!(store.labels_for(&a).unwrap().contains(&LabelId::new("l1")));
    }

    #[test]
    fn test_done_overrides_settle_when_server_agrees() {
        let mut store = AnnotationStore::default();
        let a = ChannelId::new("a");
        assert_eq!(store.set_done(&a, true), None);

        assert_eq!(store.settle_done_overrides(&[record("a", &[])]), 0);
        assert_eq!(store.done_override(&a), Some(true));

        assert_eq!(store.settle_done_overrides(&[record("a", &[]).with_done(true)]), 1);
        assert_eq!(store.done_override(&a), None);
    }
}
