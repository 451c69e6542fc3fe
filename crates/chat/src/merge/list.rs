//! Owned, sorted channel list

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;

use super::engine::{DoneOverrides, compare_activity, merge_channels};
use crate::models::{ChannelId, ChannelRecord, LabelSet, LastMessagePreview};

/// The merged channel list
///
/// Kept sorted by [`compare_activity`]. All writes go through the methods
/// below; each one touches only the fields it names.
///
/// A retraction placeholder put on a channel outlives snapshots that still
/// carry the retracted message as the channel's last one. It is dropped once
/// the channel moves on to another message.
#[derive(Debug, Clone, Default)]
pub struct ChannelList {
    records: Vec<ChannelRecord>,
    last_snapshot_at: Option<DateTime<Utc>>,
    retracted: HashMap<ChannelId, LastMessagePreview>,
}

impl ChannelList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current records in display order
    pub fn records(&self) -> &[ChannelRecord] {
        &self.records
    }

    pub fn get(&self, id: &ChannelId) -> Option<&ChannelRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &ChannelId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ChannelId> {
        self.records.iter().map(|r| &r.id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Issue time of the last snapshot applied
    pub fn last_snapshot_at(&self) -> Option<DateTime<Utc>> {
        self.last_snapshot_at
    }

    /// Reconcile against a freshly fetched snapshot
    pub fn apply_snapshot(
        &mut self,
        channels: &[ChannelRecord],
        dm_channels: &[ChannelRecord],
        done_overrides: &DoneOverrides,
        fetched_at: DateTime<Utc>,
    ) {
        self.records = merge_channels(channels, dm_channels, done_overrides, &self.records);
        self.last_snapshot_at = Some(fetched_at);

        let mut moved_on = Vec::new();
        for record in &mut self.records {
            let Some(placeholder) = self.retracted.get(&record.id) else {
                continue;
            };
            match record.last_message_preview.as_ref().and_then(|p| p.message_id.as_ref()) {
                Some(id) if placeholder.message_id.as_ref() == Some(id) => {
                    record.last_message_preview = Some(placeholder.clone());
                }
                Some(_) => moved_on.push(record.id.clone()),
                None => {}
            }
        }
        for id in moved_on {
            self.retracted.remove(&id);
        }
        let records = &self.records;
        self.retracted.retain(|id, _| records.iter().any(|r| &r.id == id));
        debug!("Channel list now holds {} channels", self.records.len());
    }

    /// Patch name and/or image. `Some(None)` clears the image.
    pub fn patch_details(
        &mut self,
        id: &ChannelId,
        display_name: Option<String>,
        group_image: Option<Option<String>>,
    ) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        if let Some(name) = display_name {
            record.display_name = name;
        }
        if let Some(image) = group_image {
            record.group_image = image;
        }
        true
    }

    /// Set the display name, returning the previous one
    pub fn rename(&mut self, id: &ChannelId, display_name: &str) -> Option<String> {
        let record = self.get_mut(id)?;
        Some(std::mem::replace(
            &mut record.display_name,
            display_name.to_string(),
        ))
    }

    /// Remove a channel entirely
    pub fn remove(&mut self, id: &ChannelId) -> Option<ChannelRecord> {
        let idx = self.records.iter().position(|r| &r.id == id)?;
        self.retracted.remove(id);
        Some(self.records.remove(idx))
    }

    pub fn set_done(&mut self, id: &ChannelId, is_done: bool) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.is_done = is_done;
                true
            }
            None => false,
        }
    }

    pub fn set_labels(&mut self, id: &ChannelId, labels: LabelSet) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.user_labels = labels;
                true
            }
            None => false,
        }
    }

    /// Record a newer last message and keep the list sorted
    ///
    /// Older messages are ignored so that out-of-order delivery across
    /// channels cannot move a preview backwards.
    pub fn set_last_message(
        &mut self,
        id: &ChannelId,
        preview: LastMessagePreview,
        at: DateTime<Utc>,
    ) -> bool {
        let preview = self.mask_retracted(id, preview);
        let is_retracted = preview.is_retracted;
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        if record.last_message_timestamp.is_some_and(|held| held > at) {
            return false;
        }
        record.last_message_preview = Some(preview);
        record.last_message_timestamp = Some(at);
        if !is_retracted {
            self.retracted.remove(id);
        }
        self.records.sort_by(compare_activity);
        true
    }

    /// Swap the preview without touching ordering, returning the old value
    pub fn replace_preview(
        &mut self,
        id: &ChannelId,
        preview: Option<LastMessagePreview>,
    ) -> Option<Option<LastMessagePreview>> {
        let placeholder = preview
            .as_ref()
            .filter(|p| p.is_retracted && p.message_id.is_some())
            .cloned();
        let record = self.get_mut(id)?;
        let previous = std::mem::replace(&mut record.last_message_preview, preview);
        match placeholder {
            Some(placeholder) => self.retracted.insert(id.clone(), placeholder),
            None => self.retracted.remove(id),
        };
        Some(previous)
    }

    /// Swap in the held placeholder if `preview` is for a retracted message
    pub fn mask_retracted(&self, id: &ChannelId, preview: LastMessagePreview) -> LastMessagePreview {
        match self.retracted.get(id) {
            Some(placeholder) if preview.message_id.is_some() && placeholder.message_id == preview.message_id => {
                placeholder.clone()
            }
            _ => preview,
        }
    }

    fn get_mut(&mut self, id: &ChannelId) -> Option<&mut ChannelRecord> {
        self.records.iter_mut().find(|r| &r.id == id)
    }
}
