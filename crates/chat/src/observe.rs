//! Change notification for read-model consumers

use std::sync::Arc;

use crate::actions::ActionFailure;
use crate::models::ChannelId;

/// Which read model changed
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    ChannelList,
    Unread,
    MessageStream(ChannelId),
    Annotations,
    /// An optimistic action was rolled back; shown as a toast
    ActionFailed(ActionFailure),
}

/// Changes produced by one state transition, without repeats
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet(Vec<Change>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        if !self.0.contains(&change) {
            self.0.push(change);
        }
    }

    pub fn extend(&mut self, other: ChangeSet) {
        for change in other.0 {
            self.push(change);
        }
    }

    pub fn contains(&self, change: &Change) -> bool {
        self.0.contains(change)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.0.iter()
    }
}

impl FromIterator<Change> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        let mut set = ChangeSet::new();
        for change in iter {
            set.push(change);
        }
        set
    }
}

/// Callback interface for views that re-render on change
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: &Change);
}

/// Handle returned by [`Observers::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct Observers {
    listeners: Vec<(ListenerId, Arc<dyn ChangeListener>)>,
    next_id: u64,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns false if the id was not subscribed
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn notify(&self, changes: &ChangeSet) {
        for change in changes.iter() {
            for (_, listener) in &self.listeners {
                listener.on_change(change);
            }
        }
    }
}
