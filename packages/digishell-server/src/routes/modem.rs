use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, StatusResponse};

/// Highest audio carrier fldigi accepts
const MAX_CARRIER_HZ: i64 = 4000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/modem", get(modem_info))
        .route("/api/modem/list", get(list_modems))
        .route("/api/modem/set", post(set_modem))
        .route("/api/modem/carrier", get(get_carrier).post(set_carrier))
        .route("/api/modem/bandwidth", get(get_bandwidth).post(set_bandwidth))
}

#[derive(Debug, Serialize)]
struct ModemInfo {
    name: String,
    carrier: i64,
    bandwidth: i64,
}

async fn modem_info(State(state): State<Arc<AppState>>) -> ApiResult<Json<ModemInfo>> {
    let link = &state.link;
    Ok(Json(ModemInfo {
        name: link.modem().await?,
        carrier: link.carrier().await?,
        bandwidth: link.bandwidth().await?,
    }))
}

#[derive(Debug, Serialize)]
struct ModemList {
    modems: Vec<String>,
}

async fn list_modems(State(state): State<Arc<AppState>>) -> ApiResult<Json<ModemList>> {
    Ok(Json(ModemList {
        modems: state.link.modem_names().await?,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModemSetRequest {
    #[serde(alias = "modem_name")]
    modem_name: String,
}

async fn set_modem(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModemSetRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let name = request.modem_name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("modem name is required".to_string()));
    }
    state.link.set_modem(name).await?;
    Ok(Json(StatusResponse::ok(format!("Modem set to {name}"))))
}

#[derive(Debug, Serialize, Deserialize)]
struct Carrier {
    frequency: i64,
}

async fn get_carrier(State(state): State<Arc<AppState>>) -> ApiResult<Json<Carrier>> {
    Ok(Json(Carrier {
        frequency: state.link.carrier().await?,
    }))
}

async fn set_carrier(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Carrier>,
) -> ApiResult<Json<StatusResponse>> {
    if !(0..=MAX_CARRIER_HZ).contains(&request.frequency) {
        return Err(ApiError::BadRequest(format!(
            "carrier must be between 0 and {MAX_CARRIER_HZ} Hz"
        )));
    }
    state.link.set_carrier(request.frequency).await?;
    Ok(Json(StatusResponse::ok(format!(
        "Carrier set to {} Hz",
        request.frequency
    ))))
}

#[derive(Debug, Serialize, Deserialize)]
struct Bandwidth {
    bandwidth: i64,
}

async fn get_bandwidth(State(state): State<Arc<AppState>>) -> ApiResult<Json<Bandwidth>> {
    Ok(Json(Bandwidth {
        bandwidth: state.link.bandwidth().await?,
    }))
}

async fn set_bandwidth(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Bandwidth>,
) -> ApiResult<Json<StatusResponse>> {
    if request.bandwidth < 0 {
        return Err(ApiError::BadRequest("bandwidth cannot be negative".to_string()));
    }
    state.link.set_bandwidth(request.bandwidth).await?;
    Ok(Json(StatusResponse::ok(format!(
        "Bandwidth set to {} Hz",
        request.bandwidth
    ))))
}
