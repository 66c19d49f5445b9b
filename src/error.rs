use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("order already taken")]
    AlreadyClaimed,

    #[error("you are already on a delivery")]
    CourierBusy,

    #[error("assignment was already accepted and cannot be recalled")]
    CannotRecall,

    #[error("assignment is not open for acceptance")]
    NotEligible,

    #[error("invalid otp")]
    InvalidOtp,

    #[error("otp has expired")]
    OtpExpired,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) | AppError::InvalidOtp => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_)
            | AppError::AlreadyClaimed
            | AppError::CourierBusy
            | AppError::CannotRecall
            | AppError::NotEligible => StatusCode::CONFLICT,
            AppError::OtpExpired => StatusCode::GONE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
