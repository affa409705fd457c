//! HTTP error mapping
//!
//! Input errors are the caller's fault and are echoed back with 422. Anything
//! else is logged and answered with a fixed 500 message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::utils::error::DigitError;

/// Body shown to callers for any non-input failure
pub const INTERNAL_DETAIL: &str = "Inference failed, try later";

#[derive(Error, Debug)]
pub enum ApiError {
    /// The image payload could not be decoded
    #[error("Input error: {0}")]
    Input(String),

    /// The request body does not match the expected schema
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DigitError> for ApiError {
    fn from(err: DigitError) -> Self {
        match err {
            DigitError::Input(e) => ApiError::Input(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Input(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ApiError::InvalidRequest(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!(detail = %msg, "Inference request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_DETAIL.to_string())
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
