//! Webhook configuration endpoints.

use super::{failure, success, success_message, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize, Default)]
pub struct ConfigureRequest {
    url: Option<String>,
    secret: Option<String>,
    events: Option<Vec<String>>,
}

pub async fn configure(
    State(state): State<AppState>,
    Json(request): Json<ConfigureRequest>,
) -> Response {
    let Some(url) = request.url.filter(|u| !u.is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "url is required");
    };
    if reqwest::Url::parse(&url).is_err() {
        return failure(StatusCode::BAD_REQUEST, "Invalid URL format");
    }

    let events = request.events.unwrap_or_else(|| vec!["*".to_string()]);
    state.webhook.configure(url, request.secret, events);

    let config = state.webhook.config();
    success(json!({
        "url": config.as_ref().map(|c| c.url.clone()),
        "events": config.as_ref().map(|c| c.events.clone()),
        "hasSecret": config.as_ref().is_some_and(|c| c.secret.is_some()),
    }))
}

pub async fn status(State(state): State<AppState>) -> Response {
    match state.webhook.config() {
        None => success(json!({
            "configured": false,
            "enabled": false,
        })),
        Some(config) => success(json!({
            "configured": true,
            "enabled": config.enabled,
            "url": config.url,
            "events": config.events,
            "hasSecret": config.secret.is_some(),
        })),
    }
}

pub async fn enable(State(state): State<AppState>) -> Response {
    if state.webhook.config().is_none() {
        return failure(
            StatusCode::BAD_REQUEST,
            "No webhook configured. Use POST /webhooks/configure first.",
        );
    }
    state.webhook.enable();
    success_message("Webhook enabled successfully")
}

pub async fn disable(State(state): State<AppState>) -> Response {
    state.webhook.disable();
    success_message("Webhook disabled successfully")
}

pub async fn test(State(state): State<AppState>) -> Response {
    if state.webhook.config().is_none() {
        return failure(StatusCode::BAD_REQUEST, "No webhook configured");
    }
    state
        .webhook
        .send(
            "webhook.test",
            json!({
                "message": "This is a test webhook",
                "timestamp": Utc::now().to_rfc3339(),
            }),
        )
        .await;
    success_message("Test webhook sent successfully")
}
