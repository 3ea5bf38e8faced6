//! Event streaming to browser clients.
//!
//! ```text
//!  LayoutState ──┐                       ┌──► Subscriber queue ──► SSE connection
//!  ArtifactStore ┼──► EventSink (hub) ───┼──► Subscriber queue ──► SSE connection
//!  ChatApp ──────┘                       └──► Subscriber queue ──► SSE connection
//! ```
//!
//! New connections are registered through [`BroadcastHub::register_with_replay`]
//! so they start with the current layout and artifacts.

mod handler;
mod hub;
mod replay;
pub mod types;

pub use handler::{SubscriberStream, sse_response};
pub use hub::{BroadcastHub, Subscriber, SubscriberId};
pub use replay::{ConnectionReplay, ReplaySource};
pub use types::{Attachment, ChatEvent, Message};

/// Destination for events produced by state mutations.
///
/// Implementations must not block; callers invoke `emit` synchronously,
/// possibly from code running outside any async runtime.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ChatEvent);

    /// Run `produce` and emit the event it returns as one step.
    ///
    /// State objects mutate inside `produce`, so a sink that serializes these
    /// calls delivers events in the same order the mutations happened.
    /// `produce` must not call back into the sink.
    fn emit_with(&self, produce: &mut dyn FnMut() -> Option<ChatEvent>) {
        if let Some(event) = produce() {
            self.emit(event);
        }
    }
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ChatEvent) {}
}
