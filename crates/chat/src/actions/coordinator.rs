//! Optimistic actions: snapshot, apply, then commit or roll back

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;

use crate::annotations::LabelScope;
use crate::error::BackendError;
use crate::models::{ChannelId, Label, LabelId, LastMessagePreview, MessageId, StreamMessage};
use crate::observe::{Change, ChangeSet};
use crate::sync::ChatState;

/// Identifies an action between `begin` and `settle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A user-initiated mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    RetractMessage {
        channel_id: ChannelId,
        message_id: MessageId,
    },
    SetDone {
        channel_id: ChannelId,
        is_done: bool,
    },
    AddLabel {
        channel_id: ChannelId,
        label: Label,
    },
    RemoveLabel {
        channel_id: ChannelId,
        label_id: LabelId,
    },
    RenameChannel {
        channel_id: ChannelId,
        display_name: String,
    },
    /// Client-only; commits immediately
    TogglePin { channel_id: ChannelId },
    RenameLabel {
        label_id: LabelId,
        label_text: String,
    },
    DeleteLabel { label_id: LabelId },
}

/// The piece of state an action changes
///
/// Two pending actions on the same entity are ordered: the later one is
/// snapshotted against the earlier one's optimistic state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Message(ChannelId, MessageId),
    ChannelDone(ChannelId),
    ChannelLabel(ChannelId, LabelId),
    ChannelName(ChannelId),
    ChannelPin(ChannelId),
    LabelDefinition(LabelId),
}

impl ActionKind {
    pub fn entity(&self) -> EntityKey {
        match self {
            ActionKind::RetractMessage { channel_id, message_id } => {
                EntityKey::Message(channel_id.clone(), message_id.clone())
            }
            ActionKind::SetDone { channel_id, .. } => EntityKey::ChannelDone(channel_id.clone()),
            ActionKind::AddLabel { channel_id, label } => {
                EntityKey::ChannelLabel(channel_id.clone(), label.label_id.clone())
            }
            ActionKind::RemoveLabel { channel_id, label_id } => {
                EntityKey::ChannelLabel(channel_id.clone(), label_id.clone())
            }
            ActionKind::RenameChannel { channel_id, .. } => EntityKey::ChannelName(channel_id.clone()),
            ActionKind::TogglePin { channel_id } => EntityKey::ChannelPin(channel_id.clone()),
            ActionKind::RenameLabel { label_id, .. } | ActionKind::DeleteLabel { label_id } => {
                EntityKey::LabelDefinition(label_id.clone())
            }
        }
    }

    /// Whether a server call confirms the action
    pub fn needs_rpc(&self) -> bool {
        !matches!(self, ActionKind::TogglePin { .. })
    }

    /// Short description for failure notifications
    pub fn describe(&self) -> String {
        match self {
            ActionKind::RetractMessage { .. } => "Retract message".to_string(),
            ActionKind::SetDone { is_done: true, .. } => "Mark as done".to_string(),
            ActionKind::SetDone { is_done: false, .. } => "Mark as not done".to_string(),
            ActionKind::AddLabel { label, .. } => format!("Add label \"{}\"", label.label_text),
            ActionKind::RemoveLabel { .. } => "Remove label".to_string(),
            ActionKind::RenameChannel { .. } => "Rename channel".to_string(),
            ActionKind::TogglePin { .. } => "Pin channel".to_string(),
            ActionKind::RenameLabel { label_text, .. } => format!("Rename label to \"{label_text}\""),
            ActionKind::DeleteLabel { .. } => "Delete label".to_string(),
        }
    }
}

/// User-visible notification produced when an action is rolled back
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{description} failed: {}", .error.message)]
pub struct ActionFailure {
    pub action_id: ActionId,
    pub description: String,
    pub error: BackendError,
}

/// State captured before an optimistic apply, restored verbatim on rollback
#[derive(Debug, Clone, PartialEq)]
enum Snapshot {
    Message {
        channel_id: ChannelId,
        message: Option<StreamMessage>,
        /// Outer `None`: the preview was not touched
        list_preview: Option<Option<LastMessagePreview>>,
        ledger_preview: Option<Option<LastMessagePreview>>,
    },
    Done {
        channel_id: ChannelId,
        override_before: Option<bool>,
        list_before: Option<bool>,
    },
    ChannelLabel {
        channel_id: ChannelId,
        label_id: LabelId,
        label: Option<Label>,
        /// Catalog entry the add will create; `None` if it already exists
        created_definition: Option<Label>,
    },
    ChannelName {
        channel_id: ChannelId,
        display_name: Option<String>,
    },
    Pin,
    LabelDefinition {
        label_id: LabelId,
        definition: Option<Label>,
        assignments: Vec<(ChannelId, Label)>,
    },
}

/// A begun action: snapshot plus the change it applied
#[derive(Debug, Clone)]
pub struct Action {
    pub id: ActionId,
    pub kind: ActionKind,
    snapshot: Snapshot,
}

impl Action {
    /// Capture the state `kind` is about to change
    fn capture(id: ActionId, kind: ActionKind, state: &ChatState) -> Self {
        let snapshot = match &kind {
            ActionKind::RetractMessage { channel_id, message_id } => Snapshot::Message {
                channel_id: channel_id.clone(),
                message: state
                    .streams
                    .page(channel_id)
                    .and_then(|page| page.get(message_id))
                    .cloned(),
                list_preview: state
                    .channels
                    .get(channel_id)
                    .filter(|r| r.last_message_is(message_id))
                    .map(|r| r.last_message_preview.clone()),
                ledger_preview: state
                    .unread
                    .entry(channel_id)
                    .filter(|e| {
                        e.last_message_preview
                            .as_ref()
                            .and_then(|p| p.message_id.as_ref())
                            .is_some_and(|id| id == message_id)
                    })
                    .map(|e| e.last_message_preview.clone()),
            },
            ActionKind::SetDone { channel_id, .. } => Snapshot::Done {
                channel_id: channel_id.clone(),
                override_before: state.annotations.done_override(channel_id),
                list_before: state.channels.get(channel_id).map(|r| r.is_done),
            },
            ActionKind::AddLabel { channel_id, label } => Snapshot::ChannelLabel {
                channel_id: channel_id.clone(),
                label_id: label.label_id.clone(),
                label: state.annotations.channel_label(channel_id, &label.label_id),
                created_definition: state
                    .annotations
                    .catalog_label(&label.label_id)
                    .is_none()
                    .then(|| label.clone()),
            },
            ActionKind::RemoveLabel { channel_id, label_id } => Snapshot::ChannelLabel {
                channel_id: channel_id.clone(),
                label_id: label_id.clone(),
                label: state.annotations.channel_label(channel_id, label_id),
                created_definition: None,
            },
            ActionKind::RenameChannel { channel_id, .. } => Snapshot::ChannelName {
                channel_id: channel_id.clone(),
                display_name: state.channels.get(channel_id).map(|r| r.display_name.clone()),
            },
            ActionKind::TogglePin { .. } => Snapshot::Pin,
            ActionKind::RenameLabel { label_id, .. } | ActionKind::DeleteLabel { label_id } => {
                Snapshot::LabelDefinition {
                    label_id: label_id.clone(),
                    definition: state.annotations.catalog_label(label_id),
                    assignments: state
                        .annotations
                        .channels_with_label(label_id)
                        .into_iter()
                        .filter_map(|c| {
                            let label = state.annotations.channel_label(&c, label_id)?;
                            Some((c, label))
                        })
                        .collect(),
                }
            }
        };
        Self { id, kind, snapshot }
    }

    /// Apply the optimistic change
    fn apply(&self, state: &mut ChatState, placeholder: &str) -> ChangeSet {
        let mut changes = ChangeSet::new();
        match &self.kind {
            ActionKind::RetractMessage { channel_id, message_id } => {
                let retracted = state.streams.retract(channel_id, message_id);
                if retracted.is_some() {
                    changes.push(Change::MessageStream(channel_id.clone()));
                }
                let Snapshot::Message {
                    list_preview,
                    ledger_preview,
                    ..
                } = &self.snapshot
                else {
                    return changes;
                };
                if list_preview.is_some() || ledger_preview.is_some() {
                    let owner = retracted.as_ref().map(|m| m.owner.clone()).unwrap_or_default();
                    let message_type = retracted.map(|m| m.message_type).unwrap_or_default();
                    let preview =
                        LastMessagePreview::retracted(placeholder, Some(message_id.clone()), owner, message_type);
                    if list_preview.is_some() {
                        state.channels.replace_preview(channel_id, Some(preview.clone()));
                        changes.push(Change::ChannelList);
                    }
                    if ledger_preview.is_some() {
                        state.unread.replace_preview(channel_id, Some(preview));
                        changes.push(Change::Unread);
                    }
                }
            }
            ActionKind::SetDone { channel_id, is_done } => {
                state.annotations.set_done(channel_id, *is_done);
                state.channels.set_done(channel_id, *is_done);
                changes.push(Change::Annotations);
                changes.push(Change::ChannelList);
            }
            ActionKind::AddLabel { channel_id, label } => {
                state.annotations.add_label(channel_id, label.clone());
                state.mirror_labels();
                changes.push(Change::Annotations);
                changes.push(Change::ChannelList);
            }
            ActionKind::RemoveLabel { channel_id, label_id } => {
                state
                    .annotations
                    .remove_label(LabelScope::Channel(channel_id.clone()), label_id);
                state.mirror_labels();
                changes.push(Change::Annotations);
                changes.push(Change::ChannelList);
            }
            ActionKind::RenameChannel {
                channel_id,
                display_name,
            } => {
                if state.channels.rename(channel_id, display_name).is_some() {
                    changes.push(Change::ChannelList);
                }
            }
            ActionKind::TogglePin { channel_id } => {
                state.annotations.toggle_pin(channel_id);
                changes.push(Change::Annotations);
            }
            ActionKind::RenameLabel { label_id, label_text } => {
                state.annotations.rename_label(label_id, label_text);
                state.mirror_labels();
                changes.push(Change::Annotations);
                changes.push(Change::ChannelList);
            }
            ActionKind::DeleteLabel { label_id } => {
                state.annotations.delete_label(label_id);
                state.mirror_labels();
                changes.push(Change::Annotations);
                changes.push(Change::ChannelList);
            }
        }
        changes
    }

    /// Restore the captured state
    fn rollback(self, state: &mut ChatState) -> ChangeSet {
        let mut changes = ChangeSet::new();
        match self.snapshot {
            Snapshot::Message {
                channel_id,
                message,
                list_preview,
                ledger_preview,
            } => {
                if let Some(message) = message
                    && state.streams.restore(message)
                {
                    changes.push(Change::MessageStream(channel_id.clone()));
                }
                if let Some(preview) = list_preview {
                    state.channels.replace_preview(&channel_id, preview);
                    changes.push(Change::ChannelList);
                }
                if let Some(preview) = ledger_preview {
                    state.unread.replace_preview(&channel_id, preview);
                    changes.push(Change::Unread);
                }
            }
            Snapshot::Done {
                channel_id,
                override_before,
                list_before,
            } => {
                state.annotations.restore_done(&channel_id, override_before);
                if let Some(is_done) = list_before {
                    state.channels.set_done(&channel_id, is_done);
                }
                changes.push(Change::Annotations);
                changes.push(Change::ChannelList);
            }
            Snapshot::ChannelLabel {
                channel_id,
                label_id,
                label,
                created_definition,
            } => {
                // A label renamed since the capture comes back under its current text
                let label = label.map(|l| state.annotations.catalog_label(&l.label_id).unwrap_or(l));
                state.annotations.restore_channel_label(&channel_id, &label_id, label);
                // Only undo a catalog entry this action created and nobody renamed since
                if created_definition.is_some() && state.annotations.catalog_label(&label_id) == created_definition {
                    state.annotations.restore_label_definition(&label_id, None, Vec::new());
                }
                state.mirror_labels();
                changes.push(Change::Annotations);
                changes.push(Change::ChannelList);
            }
            Snapshot::ChannelName {
                channel_id,
                display_name,
            } => {
                if let Some(name) = display_name {
                    state.channels.rename(&channel_id, &name);
                    changes.push(Change::ChannelList);
                }
            }
            Snapshot::Pin => {}
            Snapshot::LabelDefinition {
                label_id,
                definition,
                assignments,
            } => {
                state
                    .annotations
                    .restore_label_definition(&label_id, definition, assignments);
                state.mirror_labels();
                changes.push(Change::Annotations);
                changes.push(Change::ChannelList);
            }
        }
        changes
    }
}

/// Outcome of [`Coordinator::begin`]
#[derive(Debug, Clone, PartialEq)]
pub enum Begun {
    /// Applied; waiting for the server
    Pending(ActionId, ChangeSet),
    /// Applied and final; no server call exists for it
    Committed(ChangeSet),
}

impl Begun {
    pub fn changes(&self) -> &ChangeSet {
        match self {
            Begun::Pending(_, changes) | Begun::Committed(changes) => changes,
        }
    }
}

/// Outcome of settling an action
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Committed,
    /// The snapshot was restored
    RolledBack(ActionFailure, ChangeSet),
    /// A later pending action on the same entity took over the snapshot;
    /// nothing was restored
    Superseded(ActionFailure),
    /// No pending action has this id
    Unknown,
}

impl Settled {
    pub fn failure(&self) -> Option<&ActionFailure> {
        match self {
            Settled::RolledBack(failure, _) | Settled::Superseded(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Tracks in-flight optimistic actions
pub struct Coordinator {
    pending: BTreeMap<ActionId, Action>,
    next_id: u64,
    retracted_placeholder: String,
}

impl Coordinator {
    pub fn new(retracted_placeholder: impl Into<String>) -> Self {
        Self {
            pending: BTreeMap::new(),
            next_id: 1,
            retracted_placeholder: retracted_placeholder.into(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: ActionId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Snapshot the affected state and apply the change
    ///
    /// The snapshot is taken against the current state, so it already
    /// includes any earlier pending action's optimistic change.
    pub fn begin(&mut self, kind: ActionKind, state: &mut ChatState) -> Begun {
        let id = ActionId(self.next_id);
        self.next_id += 1;

        let action = Action::capture(id, kind, state);
        let changes = action.apply(state, &self.retracted_placeholder);
        debug!("Action {} applied: {}", id, action.kind.describe());

        if action.kind.needs_rpc() {
            self.pending.insert(id, action);
            Begun::Pending(id, changes)
        } else {
            Begun::Committed(changes)
        }
    }

    /// Resolve a pending action with the server's answer
    pub fn settle(&mut self, id: ActionId, result: Result<(), BackendError>, state: &mut ChatState) -> Settled {
        let Some(action) = self.pending.remove(&id) else {
            return Settled::Unknown;
        };

        let error = match result {
            Ok(()) => {
                debug!("Action {} committed", id);
                return Settled::Committed;
            }
            Err(error) => error,
        };

        let failure = ActionFailure {
            action_id: id,
            description: action.kind.describe(),
            error,
        };

        let entity = action.kind.entity();
        let successor = self
            .pending
            .range_mut(id..)
            .map(|(_, a)| a)
            .find(|a| a.kind.entity() == entity);
        if let Some(later) = successor {
            info!(
                "Action {} failed; snapshot handed to pending action {}",
                id, later.id
            );
            later.snapshot = action.snapshot;
            return Settled::Superseded(failure);
        }

        warn!("Rolling back action {}: {}", id, failure);
        let mut changes = action.rollback(state);
        changes.push(Change::ActionFailed(failure.clone()));
        Settled::RolledBack(failure, changes)
    }

    /// Begin, call the server and settle in one step
    pub fn perform<F>(&mut self, kind: ActionKind, state: &mut ChatState, rpc: F) -> (Settled, ChangeSet)
    where
        F: FnOnce(&ActionKind) -> Result<(), BackendError>,
    {
        let begun = self.begin(kind.clone(), state);
        let mut changes = begun.changes().clone();
        match begun {
            Begun::Committed(_) => (Settled::Committed, changes),
            Begun::Pending(id, _) => {
                let settled = self.settle(id, rpc(&kind), state);
                if let Settled::RolledBack(_, rollback_changes) = &settled {
                    changes.extend(rollback_changes.clone());
                }
                (settled, changes)
            }
        }
    }
}
