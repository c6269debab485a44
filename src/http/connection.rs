//! Connection management endpoints.

use super::{envelope, failure, success, success_message, AppState};
use crate::session::LinkMode;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

pub async fn status(State(state): State<AppState>) -> Response {
    let session = state.session.state().await;
    success(json!({
        "isConnected": session.connected,
        "hasQRCode": session.qr_code.is_some(),
        "hasPairingCode": session.pairing_code.is_some(),
        "phoneNumber": session.phone_number,
        "lastQRUpdate": session.qr_issued_at,
        "lastPairingUpdate": session.pairing_issued_at,
        "user": session.identity,
    }))
}

pub async fn qr(State(state): State<AppState>) -> Response {
    let session = state.session.state().await;
    match session.qr_code {
        None => failure(
            StatusCode::NOT_FOUND,
            "No QR code available. Bot might already be connected or waiting for initialization.",
        ),
        Some(qr_code) => success(json!({
            "qrCode": qr_code,
            "timestamp": session.qr_issued_at,
            "expiresIn": "60 seconds",
        })),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PairingRequest {
    phone_number: Option<String>,
}

pub async fn request_pairing(
    State(state): State<AppState>,
    Json(request): Json<PairingRequest>,
) -> Response {
    let Some(phone_number) = request.phone_number.filter(|p| !p.is_empty()) else {
        return failure(
            StatusCode::BAD_REQUEST,
            "phoneNumber is required (format: 628XXXXXXXXX)",
        );
    };
    info!(%phone_number, "pairing mode requested");
    state
        .session
        .reconnect(Some(LinkMode::Pairing), Some(phone_number))
        .await;
    success_message("Pairing mode activated. Check for pairing code.")
}

pub async fn pairing_code(State(state): State<AppState>) -> Response {
    let session = state.session.state().await;
    match session.pairing_code {
        None => success(json!({
            "pairingCode": null,
            "status": "waiting_for_code",
        })),
        Some(code) => success(json!({
            "pairingCode": code,
            "phoneNumber": session.phone_number,
            "timestamp": session.pairing_issued_at,
            "expiresIn": "60 seconds",
        })),
    }
}

pub async fn disconnect(State(state): State<AppState>) -> Response {
    state.session.logout().await;
    info!("bot disconnected via control surface");
    success_message("Disconnected successfully")
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectRequest {
    mode: Option<String>,
    phone_number: Option<String>,
}

pub async fn reconnect(
    State(state): State<AppState>,
    Json(request): Json<ReconnectRequest>,
) -> Response {
    let mode = match request.mode.as_deref() {
        Some("qr") => Some(LinkMode::Qr),
        Some("pairing") => Some(LinkMode::Pairing),
        Some(_) => {
            return failure(StatusCode::BAD_REQUEST, "mode must be 'qr' or 'pairing'");
        }
        None => None,
    };
    info!(?mode, "reconnecting bot");
    state.session.reconnect(mode, request.phone_number).await;
    envelope(json!({
        "success": true,
        "message": "Bot reconnection initiated",
        "mode": match mode {
            Some(LinkMode::Pairing) => "pairing",
            _ => "qr",
        },
    }))
}
