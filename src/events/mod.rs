//! Internal event bus.
//!
//! Lifecycle transitions and normalized inbound messages are the only event
//! producers; the webhook relay and any embedding caller consume them. The
//! set of variants is closed: adding one means deciding its wire name and
//! payload shape at the same time.

use crate::transport::RawMessage;
use crate::types::GROUP_SERVER;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Bus capacity; slow subscribers lose oldest events rather than blocking
/// the lifecycle manager.
const BUS_CAPACITY: usize = 256;

/// Events published on the internal bus.
#[derive(Clone, Debug)]
pub enum Event {
    /// A link challenge to display (recurs until consumed).
    Qr { code: String },

    /// A pairing code for phone-number linking.
    PairingCode { code: String },

    /// Transport connected and authenticated.
    Ready,

    /// An authentication attempt failed (attempt-scoped, not fatal).
    AuthFailure { message: String },

    /// Operator-initiated connection change. Never produced by the
    /// transport's own close detection.
    ConnectionUpdate { reason: UpdateReason },

    /// Normalized inbound message.
    Message(CanonicalMessage),
}

impl Event {
    /// Wire name used for webhook filtering and the event-name header.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Qr { .. } => "qr.update",
            Event::PairingCode { .. } => "pairing.code",
            Event::Ready => "connection.ready",
            Event::AuthFailure { .. } => "auth.failure",
            Event::ConnectionUpdate { .. } => "connection.update",
            Event::Message(_) => "message.received",
        }
    }
}

/// Reasons carried by [`Event::ConnectionUpdate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateReason {
    ManualLogout,
}

impl UpdateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateReason::ManualLogout => "manual_logout",
        }
    }
}

/// Classification of a canonical message. Exactly one per message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    File,
    Voice,
    Location,
    Poll,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
            MessageKind::Voice => "voice",
            MessageKind::Location => "location",
            MessageKind::Poll => "poll",
        }
    }
}

/// Normalized inbound message. Created per accepted protocol notification
/// and discarded after dispatch; nothing here is persisted.
#[derive(Clone, Debug)]
pub struct CanonicalMessage {
    /// Sender in canonical display form (user phone JID or group id).
    pub from: String,
    /// Literal text, or a synthetic marker for non-text kinds.
    pub body: String,
    pub kind: MessageKind,
    /// The original protocol message, kept for quoting/forwarding through
    /// the transport facade; never interpreted further here.
    pub raw: Arc<RawMessage>,
}

impl CanonicalMessage {
    pub fn is_group(&self) -> bool {
        self.from.split('@').nth(1) == Some(GROUP_SERVER)
    }
}

/// Broadcast bus handle. Cheap to clone; publishing never blocks.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(Event::Qr { code: "x".into() }.name(), "qr.update");
        assert_eq!(Event::Ready.name(), "connection.ready");
        assert_eq!(
            Event::ConnectionUpdate {
                reason: UpdateReason::ManualLogout
            }
            .name(),
            "connection.update"
        );
        assert_eq!(UpdateReason::ManualLogout.as_str(), "manual_logout");
    }

    #[tokio::test]
    async fn bus_fan_out() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(Event::Ready);
        assert!(matches!(a.recv().await.unwrap(), Event::Ready));
        assert!(matches!(b.recv().await.unwrap(), Event::Ready));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(Event::Ready);
    }

    #[test]
    fn group_detection_from_display_form() {
        let msg = CanonicalMessage {
            from: "12036304@g.us".into(),
            body: "hi".into(),
            kind: MessageKind::Text,
            raw: Arc::new(RawMessage::default()),
        };
        assert!(msg.is_group());
    }
}
