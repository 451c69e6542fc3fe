//! User-initiated mutations, applied optimistically
//!
//! An action is applied to local state at once, then confirmed by a server
//! call. On failure the exact pre-action snapshot is restored and an
//! [`ActionFailure`] is surfaced.

mod coordinator;
mod handler;

pub use coordinator::{Action, ActionFailure, ActionId, ActionKind, Begun, Coordinator, EntityKey, Settled};
pub use handler::ActionHandler;
