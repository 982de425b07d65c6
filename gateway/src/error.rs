use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{upstream} service is unavailable: {reason}")]
    Unreachable {
        upstream: &'static str,
        reason: String,
    },
    #[error("{0} service timed out")]
    Timeout(&'static str),
    #[error("{upstream} service sent an unreadable response: {reason}")]
    BadResponse {
        upstream: &'static str,
        reason: String,
    },
    #[error("request body is too large")]
    BodyTooLarge,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Unreachable { .. } | GatewayError::BadResponse { .. } => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        };
        if status.is_server_error() {
            error!(error = %self, "proxy request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
