//! Messaging pass-through endpoints.

use super::{failure, success_message, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};

#[derive(Deserialize, Default)]
pub struct SendTextRequest {
    number: Option<String>,
    message: Option<String>,
}

pub async fn send_text(
    State(state): State<AppState>,
    Json(request): Json<SendTextRequest>,
) -> Response {
    let (Some(number), Some(message)) = (request.number, request.message) else {
        return failure(StatusCode::BAD_REQUEST, "Number and message are required");
    };

    match state.session.send_text(&number, &message).await {
        Ok(_) => {
            info!(%number, "message sent");
            success_message("Message sent successfully")
        }
        Err(e) => {
            error!(%number, error = %e, "failed to send message");
            failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}
