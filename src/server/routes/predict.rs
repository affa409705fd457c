//! Digit prediction endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::server::error::ApiError;
use crate::server::state::SharedState;

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Base64-encoded image, optionally as a `data:` URI
    pub image_base64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: usize,
}

/// POST /predict - Classify a single digit image
pub async fn predict(
    State(state): State<SharedState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;

    debug!("Received payload of {} bytes", request.image_base64.len());
    let prediction = state.pool.classify(request.image_base64).await?;

    Ok(Json(PredictResponse { prediction }))
}
