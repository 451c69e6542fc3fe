//! Owned state containers of the sync layer

use crate::annotations::AnnotationStore;
use crate::merge::ChannelList;
use crate::models::ChannelId;
use crate::stream::MessageStreamCache;
use crate::unread::UnreadLedger;

/// The four caches the UI reads from
///
/// Each cache has one writer path: the router, the refresh and the action
/// coordinator reach them through this struct. Outside the crate only
/// shared borrows are handed out.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub(crate) channels: ChannelList,
    pub(crate) unread: UnreadLedger,
    pub(crate) streams: MessageStreamCache,
    pub(crate) annotations: AnnotationStore,
}

impl ChatState {
    pub fn new(annotations: AnnotationStore) -> Self {
        Self {
            annotations,
            ..Self::default()
        }
    }

    pub fn channels(&self) -> &ChannelList {
        &self.channels
    }

    pub fn unread(&self) -> &UnreadLedger {
        &self.unread
    }

    pub fn streams(&self) -> &MessageStreamCache {
        &self.streams
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    /// Copy the label overlay onto the list records, so the next merge
    /// carries it forward and `channels()` reads the same labels
    pub(crate) fn mirror_labels(&mut self) {
        let ids: Vec<ChannelId> = self.channels.ids().cloned().collect();
        for id in &ids {
            if let Some(overlay) = self.annotations.labels_for(id) {
                self.channels.set_labels(id, overlay.clone());
            }
        }
    }
}
