//! SSE framing for subscriber queues.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{HeaderName, HeaderValue};
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use log::{info, warn};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::hub::{BroadcastHub, Subscriber, SubscriberId};
use super::types::ChatEvent;

/// A subscriber's queue as a stream.
///
/// Dropping the stream unregisters the subscriber. axum drops the response
/// body when the client goes away, so this is the cleanup path for closed
/// connections.
pub struct SubscriberStream {
    id: SubscriberId,
    inner: UnboundedReceiverStream<ChatEvent>,
    hub: Arc<BroadcastHub>,
}

impl SubscriberStream {
    pub fn new(hub: Arc<BroadcastHub>, subscriber: Subscriber) -> Self {
        let (id, rx) = subscriber.into_parts();
        Self {
            id,
            inner: UnboundedReceiverStream::new(rx),
            hub,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Stream for SubscriberStream {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for SubscriberStream {
    fn drop(&mut self) {
        if self.hub.unregister(self.id) {
            info!("Stream connection {} closed", self.id);
        }
    }
}

/// Encode one event as an SSE frame (`data: <json>\n\n`).
fn to_sse_event(event: &ChatEvent) -> Option<Event> {
    match event.to_json() {
        Ok(json) => Some(Event::default().data(json)),
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.event_type(), e);
            None
        }
    }
}

/// Build the SSE response draining a subscriber stream onto the wire.
pub fn sse_response(stream: SubscriberStream) -> impl IntoResponse {
    let events = stream.filter_map(|event| async move {
        to_sse_event(&event).map(Ok::<_, Infallible>)
    });

    (
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        Sse::new(events),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::types::Message;

    #[tokio::test]
    async fn test_dropping_stream_unregisters() {
        let hub = Arc::new(BroadcastHub::new());
        let stream = SubscriberStream::new(hub.clone(), hub.register());
        let id = stream.id();
        assert!(hub.is_registered(id));

        drop(stream);
        assert!(!hub.is_registered(id));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_yields_broadcast_events() {
        let hub = Arc::new(BroadcastHub::new());
        let mut stream = SubscriberStream::new(hub.clone(), hub.register());

        hub.broadcast(Message::new("ai", "hello").into());
        let event = stream.next().await.unwrap();
        assert_eq!(event, ChatEvent::Message(Message::new("ai", "hello")));
    }
}
