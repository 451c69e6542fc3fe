//! Realtime event decoding and routing
//!
//! Raw push events are decoded into [`RealtimeEvent`] at the boundary;
//! anything malformed is dropped there with a warning and never reaches
//! the caches.

mod router;
mod types;

pub use router::{Dispatch, EventRouter};
pub use types::{EventKind, RealtimeEvent};
