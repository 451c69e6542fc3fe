//! Read models for the view layer
//!
//! Each query joins the channel list with the unread ledger and the
//! annotation overlays at read time. Nothing here mutates state.

mod channels;

pub use channels::{
    ChannelSummary, channels_with_label, done_channels, message_stream, pinned_channels,
    sorted_channel_list, unread_total,
};
