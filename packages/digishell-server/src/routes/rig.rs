use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, StatusResponse};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rig", get(rig_info))
        .route("/api/rig/frequency", post(set_frequency))
        .route("/api/rig/mode", post(set_mode))
}

/// Fields the rig control backend cannot report are left out
#[derive(Debug, Serialize)]
struct RigInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<String>,
}

async fn rig_info(State(state): State<Arc<AppState>>) -> ApiResult<Json<RigInfo>> {
    let link = &state.link;
    if !link.is_connected() {
        return Err(ApiError::NotConnected);
    }
    Ok(Json(RigInfo {
        name: link.rig_name().await.ok(),
        frequency: link.rig_frequency().await.ok(),
        mode: link.rig_mode().await.ok(),
    }))
}

#[derive(Debug, Deserialize)]
struct FrequencyRequest {
    frequency: f64,
}

async fn set_frequency(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FrequencyRequest>,
) -> ApiResult<Json<StatusResponse>> {
    if !request.frequency.is_finite() || request.frequency < 0.0 {
        return Err(ApiError::BadRequest(
            "frequency must be a non-negative number of Hz".to_string(),
        ));
    }
    state.link.set_rig_frequency(request.frequency).await?;
    Ok(Json(StatusResponse::ok(format!(
        "Rig frequency set to {} Hz",
        request.frequency
    ))))
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: String,
}

async fn set_mode(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModeRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let mode = request.mode.trim();
    if mode.is_empty() {
        return Err(ApiError::BadRequest("mode is required".to_string()));
    }
    state.link.set_rig_mode(mode).await?;
    Ok(Json(StatusResponse::ok(format!("Rig mode set to {mode}"))))
}
