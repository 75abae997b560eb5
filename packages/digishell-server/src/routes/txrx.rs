use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use digishell_core::{LinkError, LiveTxView, Phase, SyncOutcome, TrxState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, StatusResponse};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/txrx/status", get(trx_status))
        .route("/api/txrx/tx", post(transmit))
        .route("/api/txrx/rx", post(receive))
        .route("/api/txrx/tune", post(tune))
        .route("/api/txrx/abort", post(abort))
        .route("/api/txrx/text/tx", post(send_text))
        .route("/api/txrx/text/clear/rx", post(clear_rx))
        .route("/api/txrx/text/clear/tx", post(clear_tx))
        .route("/api/txrx/live", get(live_view))
        .route("/api/txrx/live/start", post(live_start))
        .route("/api/txrx/live/edit", post(live_edit))
        .route("/api/txrx/live/commit", post(live_commit))
        .route("/api/txrx/live/abort", post(live_abort))
}

#[derive(Debug, Serialize)]
struct TrxStatus {
    status: TrxState,
}

async fn trx_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<TrxStatus>> {
    Ok(Json(TrxStatus {
        status: state.link.trx_state().await?,
    }))
}

async fn transmit(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    state.link.transmit().await?;
    Ok(Json(StatusResponse::ok("Started transmitting")))
}

async fn receive(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    state.link.receive().await?;
    Ok(Json(StatusResponse::ok("Switched to receive mode")))
}

async fn tune(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    state.link.tune().await?;
    Ok(Json(StatusResponse::ok("Started tuning")))
}

/// Abort also drops any live transmission
async fn abort(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    state.live_tx.abort().await?;
    Ok(Json(StatusResponse::ok("Aborted TX/TUNE")))
}

#[derive(Debug, Deserialize)]
struct TextRequest {
    text: String,
}

async fn send_text(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextRequest>,
) -> ApiResult<Json<StatusResponse>> {
    if request.text.is_empty() {
        return Err(ApiError::BadRequest("text is required".to_string()));
    }
    if state.live_tx.phase().await != Phase::Idle {
        return Err(ApiError::Conflict(
            "a live transmission is in progress".to_string(),
        ));
    }
    state.link.queue_text(&request.text).await?;
    Ok(Json(StatusResponse::ok("Text added to transmit queue")))
}

async fn clear_rx(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    state.link.clear_rx().await?;
    Ok(Json(StatusResponse::ok("RX buffer cleared")))
}

async fn clear_tx(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    state.link.clear_tx().await?;
    Ok(Json(StatusResponse::ok("TX buffer cleared")))
}

// ============================================
// Live transmission
// ============================================

async fn live_view(State(state): State<Arc<AppState>>) -> Json<LiveTxView> {
    Json(state.live_tx.view().await)
}

async fn live_start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextRequest>,
) -> ApiResult<Json<LiveTxView>> {
    Ok(Json(state.live_tx.start(&request.text).await?))
}

#[derive(Debug, Serialize)]
struct EditResponse {
    #[serde(flatten)]
    outcome: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

/// Rejected edits answer 200 with the buffer to reset to; the client must adopt it
async fn live_edit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextRequest>,
) -> ApiResult<Json<EditResponse>> {
    let outcome = state.live_tx.sync(&request.text).await;
    let message = match &outcome {
        SyncOutcome::Inactive => {
            return Err(ApiError::Conflict(
                "no live transmission in progress".to_string(),
            ))
        }
        SyncOutcome::Offline => return Err(LinkError::NotConnected.into()),
        SyncOutcome::Failed { error } => return Err(ApiError::Remote(error.clone())),
        SyncOutcome::Rejected { warning, .. } => Some(warning.message()),
        _ => None,
    };
    Ok(Json(EditResponse { outcome, message }))
}

async fn live_commit(State(state): State<Arc<AppState>>) -> ApiResult<Json<LiveTxView>> {
    let view = state.live_tx.commit().await?;
    info!(chars = view.committed.chars().count(), "live transmission committed");
    Ok(Json(view))
}

async fn live_abort(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    state.live_tx.abort().await?;
    Ok(Json(StatusResponse::ok("Live transmission aborted")))
}
