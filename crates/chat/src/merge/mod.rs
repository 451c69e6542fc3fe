//! Merge engine: combines authoritative channel snapshots with local state
//!
//! [`merge_channels`] is the pure reconciliation step; [`ChannelList`] owns
//! its output and is the single writer for realtime patches to it.

mod engine;
mod list;

pub use engine::{DoneOverrides, compare_activity, merge_channels};
pub use list::ChannelList;
