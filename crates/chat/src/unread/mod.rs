//! Unread ledger: per-channel unread counts and last-message previews
//!
//! Decoupled from the channel list so unread state can be corrected on its
//! own schedule (per-channel fetches, realtime deltas, full resyncs).

mod ledger;

pub use ledger::{BulkOutcome, DeltaOutcome, UnreadDelta, UnreadLedger};
