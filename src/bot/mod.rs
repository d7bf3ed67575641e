/// Per-event orchestration
pub mod handler;
/// Canned reply texts
pub mod messages;
/// Outbound replies through the Send API
pub mod reply;

pub use handler::{EventHandler, Outcome};
pub use reply::{GraphApiDispatcher, ReplyDispatcher, ReplyError};
