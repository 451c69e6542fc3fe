//! Server calls behind optimistic actions

use log::info;
use std::sync::Arc;

use super::ActionKind;
use crate::backend::ChatBackend;
use crate::error::BackendError;

/// Issues the RPC that confirms an action
///
/// Local state is never touched here; the coordinator owns the optimistic
/// apply and the rollback.
pub struct ActionHandler {
    backend: Arc<dyn ChatBackend>,
}

impl ActionHandler {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Call the server for `kind`. Client-only actions succeed trivially.
    pub fn call(&self, kind: &ActionKind) -> Result<(), BackendError> {
        match kind {
            ActionKind::RetractMessage { channel_id, message_id } => {
                info!("Retracting message {} in {}", message_id, channel_id);
                self.backend.retract_message(channel_id, message_id)
            }
            ActionKind::SetDone { channel_id, is_done } => {
                info!(
                    "Marking {} as {}",
                    channel_id,
                    if *is_done { "done" } else { "not done" }
                );
                self.backend.set_channel_done(channel_id, *is_done)
            }
            ActionKind::AddLabel { channel_id, label } => {
                info!("Adding label {} to {}", label.label_id, channel_id);
                self.backend.add_channel_label(channel_id, label)
            }
            ActionKind::RemoveLabel { channel_id, label_id } => {
                info!("Removing label {} from {}", label_id, channel_id);
                self.backend.remove_channel_label(channel_id, label_id)
            }
            ActionKind::RenameChannel {
                channel_id,
                display_name,
            } => {
                info!("Renaming {}", channel_id);
                self.backend.rename_channel(channel_id, display_name)
            }
            ActionKind::TogglePin { .. } => Ok(()),
            ActionKind::RenameLabel { label_id, label_text } => {
                info!("Renaming label {}", label_id);
                self.backend.rename_label(label_id, label_text)
            }
            ActionKind::DeleteLabel { label_id } => {
                info!("Deleting label {}", label_id);
                self.backend.delete_label(label_id)
            }
        }
    }
}
