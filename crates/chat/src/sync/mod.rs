//! Sync engine: the shared state and bulk refresh
//!
//! Refreshes are safe to apply at any time: the merge is field by field, so
//! a slow fetch cannot undo events that arrived while it was in flight.

mod refresh;
mod state;
mod timing;

pub use refresh::{RefreshStats, apply_bulk_snapshot};
pub use state::ChatState;
pub use timing::cooldown_elapsed;
