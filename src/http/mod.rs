//! Control surface: thin REST layer over the lifecycle manager and the
//! webhook dispatcher. Handlers validate input, forward one call, and wrap
//! the result in a `{success, data|error}` envelope.

mod connection;
mod messaging;
mod webhooks;

use crate::session::SessionManager;
use crate::webhook::WebhookDispatcher;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub webhook: Arc<WebhookDispatcher>,
    /// When set, every request must carry it in `x-api-key`.
    pub api_key: Option<String>,
}

/// Build the control-surface router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/connection/status", get(connection::status))
        .route("/connection/qr", get(connection::qr))
        .route(
            "/connection/pairing",
            get(connection::pairing_code).post(connection::request_pairing),
        )
        .route("/connection/disconnect", post(connection::disconnect))
        .route("/connection/reconnect", post(connection::reconnect))
        .route("/webhooks/configure", post(webhooks::configure))
        .route("/webhooks/status", get(webhooks::status))
        .route("/webhooks/enable", post(webhooks::enable))
        .route("/webhooks/disable", post(webhooks::disable))
        .route("/webhooks/test", post(webhooks::test))
        .route("/messages/text", post(messaging::send_text))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .with_state(state)
}

/// Serve the control surface until the process exits.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "control surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());
    if provided == Some(expected) {
        next.run(request).await
    } else {
        warn!("forbidden request: invalid api key");
        (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Forbidden: Invalid API key"})),
        )
            .into_response()
    }
}

pub(crate) fn success<T: Serialize>(data: T) -> Response {
    Json(json!({"success": true, "data": data})).into_response()
}

pub(crate) fn success_message(message: &str) -> Response {
    Json(json!({"success": true, "message": message})).into_response()
}

pub(crate) fn failure(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({"success": false, "error": error}))).into_response()
}

pub(crate) fn envelope(value: Value) -> Response {
    Json(value).into_response()
}
