//! Event relay: internal bus to webhook sink.
//!
//! Subscribes to lifecycle and message events and forwards each one as a
//! webhook delivery with the payload shape external consumers rely on.

use crate::events::{Event, EventBus};
use crate::webhook::WebhookDispatcher;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Spawn the relay task. It runs until the bus is dropped.
pub fn spawn_event_relay(bus: &EventBus, webhook: Arc<WebhookDispatcher>) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => forward(&webhook, event).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event relay lagged, webhook deliveries lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn forward(webhook: &WebhookDispatcher, event: Event) {
    let now = Utc::now().to_rfc3339();
    let name = event.name();
    let data = match &event {
        Event::Qr { code } => json!({
            "qrCode": code,
            "timestamp": now,
        }),
        Event::PairingCode { code } => json!({
            "pairingCode": code,
            "timestamp": now,
        }),
        Event::Ready => json!({
            "status": "connected",
            "timestamp": now,
        }),
        Event::AuthFailure { message } => json!({
            "error": message,
            "timestamp": now,
        }),
        Event::ConnectionUpdate { reason } => json!({
            "reason": reason.as_str(),
            "timestamp": now,
        }),
        Event::Message(msg) => {
            info!(from = %msg.from, "message received");
            json!({
                "from": msg.from,
                "message": msg.body,
                "messageId": msg.raw.key.id,
                "type": msg.kind.as_str(),
                "isGroup": msg.is_group(),
                "timestamp": now,
            })
        }
    };
    webhook.send(name, data).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CanonicalMessage, MessageKind};
    use crate::transport::RawMessage;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn capture_sink() -> (String, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(tx): State<mpsc::UnboundedSender<Bytes>>, body: Bytes| async move {
                        let _ = tx.send(body);
                        StatusCode::OK
                    },
                ),
            )
            .with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), rx)
    }

    #[tokio::test]
    async fn relay_forwards_message_events_with_payload_shape() {
        let (url, mut rx) = capture_sink().await;
        let bus = EventBus::new();
        let webhook = Arc::new(WebhookDispatcher::new());
        webhook.configure(url, None, vec!["*".into()]);
        let _relay = spawn_event_relay(&bus, webhook);

        bus.publish(Event::Message(CanonicalMessage {
            from: "120363041@g.us".into(),
            body: "hello".into(),
            kind: MessageKind::Text,
            raw: Arc::new(RawMessage::default()),
        }));

        let body = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope["event"], "message.received");
        assert_eq!(envelope["data"]["from"], "120363041@g.us");
        assert_eq!(envelope["data"]["message"], "hello");
        assert_eq!(envelope["data"]["type"], "text");
        assert_eq!(envelope["data"]["isGroup"], true);
    }

    #[tokio::test]
    async fn relay_forwards_lifecycle_events() {
        let (url, mut rx) = capture_sink().await;
        let bus = EventBus::new();
        let webhook = Arc::new(WebhookDispatcher::new());
        webhook.configure(url, None, vec!["*".into()]);
        let _relay = spawn_event_relay(&bus, webhook);

        bus.publish(Event::Qr { code: "qr".into() });
        bus.publish(Event::Ready);

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&first).unwrap();
        assert_eq!(envelope["event"], "qr.update");
        assert_eq!(envelope["data"]["qrCode"], "qr");

        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&second).unwrap();
        assert_eq!(envelope["event"], "connection.ready");
        assert_eq!(envelope["data"]["status"], "connected");
    }
}
