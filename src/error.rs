use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::pricing::VehicleClass;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid status transition: order condition not met")]
    InvalidTransition,

    #[error("unsupported vehicle class: {0}")]
    UnsupportedVehicleClass(VehicleClass),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Text safe to show a caller. Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            AppError::InvalidTransition => {
                "invalid state transition, check if order is in correct status".to_string()
            }
            AppError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::InvalidTransition
            | AppError::UnsupportedVehicleClass(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.client_message()
        }));

        (status, body).into_response()
    }
}
