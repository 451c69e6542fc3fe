//! Contracts consumed from the remote backend
//!
//! Transport is out of scope: implementors wrap whatever RPC client the host
//! application uses. Calls are synchronous, like the rest of the crate.

mod traits;

pub use traits::{ChannelsResponse, ChatBackend, FetchedMessages, PageCursor};
