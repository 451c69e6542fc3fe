//! Per-user overlays: labels, pins and done flags
//!
//! These are client-local and survive channel-list refreshes. A refresh may
//! only reconcile them field by field.

mod pins;
mod store;

pub use pins::{PINNED_CHANNELS_KEY, PinnedSet};
pub use store::{AnnotationStore, LabelScope};
