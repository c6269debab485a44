//! Outbound webhook dispatch.
//!
//! One mutable configuration per process, owned by the dispatcher and
//! mutated only through it. Delivery is at-most-once and best-effort: a
//! single POST per event, no queue, no retry, failures logged and swallowed.

pub mod signing;

use chrono::Utc;
use serde::Serialize;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Event-name header attached to every delivery.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Signature header attached when a secret is configured.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Request timeout for a delivery attempt.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Webhook sink configuration.
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: Option<String>,
    /// Allowed event names; may contain the `*` wildcard.
    pub events: Vec<String>,
    pub enabled: bool,
}

impl WebhookConfig {
    fn allows(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event || e == "*")
    }
}

/// Delivery envelope. Field order is the wire order; the signature is
/// computed over exactly these serialized bytes.
#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    timestamp: String,
    data: serde_json::Value,
}

/// Signed, filtered, best-effort webhook sink.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    config: RwLock<Option<WebhookConfig>>,
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            config: RwLock::new(None),
        }
    }

    /// Replace the whole configuration and enable delivery.
    pub fn configure(&self, url: String, secret: Option<String>, events: Vec<String>) {
        info!(%url, ?events, "webhook configured");
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(WebhookConfig {
            url,
            secret,
            events,
            enabled: true,
        });
    }

    /// Re-enable delivery without touching the configuration. No-op when
    /// nothing was ever configured.
    pub fn enable(&self) {
        if let Some(config) = self.config.write().unwrap_or_else(PoisonError::into_inner).as_mut() {
            config.enabled = true;
            info!("webhook enabled");
        }
    }

    /// Pause delivery, keeping url/secret/events for a later enable.
    pub fn disable(&self) {
        if let Some(config) = self.config.write().unwrap_or_else(PoisonError::into_inner).as_mut() {
            config.enabled = false;
            info!("webhook disabled");
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Option<WebhookConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Deliver one event. No-op when unconfigured, disabled, or the event
    /// is filtered out. Exactly one POST is attempted otherwise; the
    /// outcome never propagates to the caller.
    pub async fn send(&self, event: &str, data: serde_json::Value) {
        // Snapshot the config; it must not be held across the request.
        let Some(config) = self.config() else {
            return;
        };
        if !config.enabled || !config.allows(event) {
            return;
        }

        let envelope = Envelope {
            event,
            timestamp: Utc::now().to_rfc3339(),
            data,
        };
        let body = match serde_json::to_vec(&envelope) {
            Ok(body) => body,
            Err(e) => {
                error!(event, error = %e, "failed to serialize webhook envelope");
                return;
            }
        };

        let mut request = self
            .client
            .post(&config.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(EVENT_HEADER, event);
        if let Some(secret) = &config.secret {
            request = request.header(SIGNATURE_HEADER, signing::sign_payload(secret, &body));
        }

        match request.body(body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(event, "webhook delivered");
            }
            Ok(response) => {
                warn!(event, status = %response.status(), "webhook delivery failed");
            }
            Err(e) => {
                error!(event, error = %e, "webhook request error");
            }
        }
    }
}

impl Default for WebhookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use tokio::sync::mpsc;

    struct Hit {
        headers: HeaderMap,
        body: Bytes,
    }

    /// Local sink capturing every request it receives.
    async fn capture_sink(status: StatusCode) -> (String, mpsc::UnboundedReceiver<Hit>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(tx): State<mpsc::UnboundedSender<Hit>>,
                          headers: HeaderMap,
                          body: Bytes| async move {
                        let _ = tx.send(Hit { headers, body });
                        status
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

    async fn expect_hit(rx: &mut mpsc::UnboundedReceiver<Hit>) -> Hit {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("sink closed")
    }

    async fn expect_no_hit(rx: &mut mpsc::UnboundedReceiver<Hit>) {
        let outcome = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(outcome.is_err(), "unexpected delivery");
    }

    #[tokio::test]
    async fn unconfigured_dispatcher_is_a_no_op() {
        let dispatcher = WebhookDispatcher::new();
        dispatcher.send("connection.ready", serde_json::json!({})).await;
    }

    #[tokio::test]
    async fn filtered_events_perform_no_network_call() {
        let (url, mut rx) = capture_sink(StatusCode::OK).await;
        let dispatcher = WebhookDispatcher::new();
        dispatcher.configure(url, None, vec!["qr.update".into()]);

        dispatcher
            .send("message.received", serde_json::json!({"from": "x"}))
            .await;
        expect_no_hit(&mut rx).await;

        dispatcher
            .send("qr.update", serde_json::json!({"qrCode": "abc"}))
            .await;
        let hit = expect_hit(&mut rx).await;
        assert_eq!(hit.headers.get(EVENT_HEADER).unwrap(), "qr.update");
    }

    #[tokio::test]
    async fn wildcard_delivers_every_event_exactly_once() {
        // Even when the sink keeps failing, each send is one attempt.
        let (url, mut rx) = capture_sink(StatusCode::INTERNAL_SERVER_ERROR).await;
        let dispatcher = WebhookDispatcher::new();
        dispatcher.configure(url, None, vec!["*".into()]);

        dispatcher.send("message.received", serde_json::json!({})).await;
        dispatcher.send("connection.ready", serde_json::json!({})).await;

        expect_hit(&mut rx).await;
        expect_hit(&mut rx).await;
        expect_no_hit(&mut rx).await;
    }

    #[tokio::test]
    async fn signature_covers_exact_transmitted_bytes() {
        let (url, mut rx) = capture_sink(StatusCode::OK).await;
        let dispatcher = WebhookDispatcher::new();
        dispatcher.configure(url, Some("hunter2".into()), vec!["*".into()]);

        dispatcher
            .send("connection.ready", serde_json::json!({"status": "connected"}))
            .await;

        let hit = expect_hit(&mut rx).await;
        let signature = hit
            .headers
            .get(SIGNATURE_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(signing::verify_signature("hunter2", &hit.body, &signature));
        assert_eq!(
            hit.headers.get("content-type").unwrap(),
            "application/json"
        );

        // The transmitted body is the canonical envelope.
        let envelope: serde_json::Value = serde_json::from_slice(&hit.body).unwrap();
        assert_eq!(envelope["event"], "connection.ready");
        assert_eq!(envelope["data"]["status"], "connected");
        assert!(envelope["timestamp"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn no_signature_header_without_secret() {
        let (url, mut rx) = capture_sink(StatusCode::OK).await;
        let dispatcher = WebhookDispatcher::new();
        dispatcher.configure(url, None, vec!["*".into()]);
        dispatcher.send("qr.update", serde_json::json!({})).await;
        let hit = expect_hit(&mut rx).await;
        assert!(hit.headers.get(SIGNATURE_HEADER).is_none());
    }

    #[tokio::test]
    async fn disable_pauses_and_enable_resumes_without_reconfiguring() {
        let (url, mut rx) = capture_sink(StatusCode::OK).await;
        let dispatcher = WebhookDispatcher::new();
        dispatcher.configure(url, Some("s".into()), vec!["*".into()]);

        dispatcher.disable();
        dispatcher.send("connection.ready", serde_json::json!({})).await;
        expect_no_hit(&mut rx).await;

        // Secret and filter survive the toggle.
        dispatcher.enable();
        let config = dispatcher.config().unwrap();
        assert_eq!(config.secret.as_deref(), Some("s"));
        dispatcher.send("connection.ready", serde_json::json!({})).await;
        expect_hit(&mut rx).await;
    }

    #[tokio::test]
    async fn configure_replaces_whole_config_and_enables() {
        let dispatcher = WebhookDispatcher::new();
        dispatcher.configure("http://a/".into(), Some("old".into()), vec!["*".into()]);
        dispatcher.disable();

        dispatcher.configure("http://b/".into(), None, vec!["qr.update".into()]);
        let config = dispatcher.config().unwrap();
        assert!(config.enabled);
        assert_eq!(config.url, "http://b/");
        assert!(config.secret.is_none());
        assert_eq!(config.events, vec!["qr.update".to_string()]);
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        // Nothing is listening on this port; send must still return.
        let dispatcher = WebhookDispatcher::new();
        dispatcher.configure(
            "http://127.0.0.1:9/hook".into(),
            Some("s".into()),
            vec!["*".into()],
        );
        dispatcher.send("connection.ready", serde_json::json!({})).await;
    }
}
