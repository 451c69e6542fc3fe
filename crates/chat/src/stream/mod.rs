//! Message stream cache for open channels
//!
//! Holds the fetched page(s) of each open channel and folds realtime
//! message events into them in place.

mod cache;

pub use cache::{MessageStreamCache, MessageStreamPage, PageDirection, Upsert};
