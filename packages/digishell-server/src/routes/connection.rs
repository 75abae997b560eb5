use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use digishell_core::{
    read_snapshot, ConnectionEvent, LinkError, StatusSnapshot, OPERATOR_DISCONNECT_MESSAGE,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, StatusResponse};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/connection", get(connection_status))
        .route("/api/connection/connect", post(connect))
        .route("/api/connection/disconnect", post(disconnect))
        .route("/api/status", get(full_status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    fldigi_connected: bool,
    subscribers: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        fldigi_connected: state.link.is_connected(),
        subscribers: state.broadcaster.subscriber_count(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionStatus {
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fldigi_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fldigi_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn connection_status(State(state): State<Arc<AppState>>) -> Json<ConnectionStatus> {
    if !state.link.is_connected() {
        return Json(ConnectionStatus {
            connected: false,
            fldigi_version: None,
            fldigi_name: None,
            error: Some(LinkError::NotConnected.to_string()),
        });
    }
    Json(ConnectionStatus {
        connected: true,
        fldigi_version: state.link.version().await.ok(),
        fldigi_name: state.link.name().await.ok(),
        error: None,
    })
}

/// Connect on operator request. A refused attempt is reported in the body, not as an HTTP error.
///
/// Any connect request lifts an operator hold, so a failed attempt is retried by the supervisor.
async fn connect(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.reconnect_gate.release();
    if state.link.is_connected() {
        return Json(StatusResponse::ok("Already connected"));
    }

    match state.link.connect().await {
        Ok(()) => {
            info!("connected to fldigi on operator request");
            let version = state.link.version().await.ok();
            let name = state.link.name().await.ok();
            state
                .broadcaster
                .publish_connection(ConnectionEvent::connected(version, name));
            Json(StatusResponse::ok("Connected to FLDIGI"))
        }
        Err(e) => {
            info!(kind = %e.kind, "operator connect failed: {}", e);
            Json(StatusResponse::failed(e.message))
        }
    }
}

/// The link stays down until the next connect request
async fn disconnect(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.reconnect_gate.hold();
    state.link.disconnect().await;
    info!("disconnected from fldigi on operator request");
    state
        .broadcaster
        .publish_connection(ConnectionEvent::lost(OPERATOR_DISCONNECT_MESSAGE));
    state.broadcaster.publish_status(StatusSnapshot::disconnected());
    Json(StatusResponse::ok("Disconnected from FLDIGI"))
}

async fn full_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusSnapshot>> {
    if !state.link.is_connected() {
        return Err(ApiError::NotConnected);
    }
    Ok(Json(read_snapshot(state.link.as_ref()).await?))
}

#[cfg(test)]
mod tests {
    use crate::state::test_support::{app_with, get, post_empty};
    use axum::http::StatusCode;
    use digishell_core::testing::FakeController;
    use digishell_core::{LinkEvent, ModemController, OPERATOR_DISCONNECT_MESSAGE};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_reports_link_state() {
        let (app, _) = app_with(Arc::new(FakeController::disconnected()));
        let (status, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["fldigiConnected"], false);
    }

    #[tokio::test]
    async fn test_connection_status_when_connected() {
        let (app, _) = app_with(Arc::new(FakeController::new()));
        let (status, body) = get(&app, "/api/connection").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], true);
        assert_eq!(body["fldigiName"], "fldigi");
        assert_eq!(body["fldigiVersion"], "4.2.05");
    }

    #[tokio::test]
    async fn test_connection_status_when_down() {
        let (app, _) = app_with(Arc::new(FakeController::disconnected()));
        let (_, body) = get(&app, "/api/connection").await;
        assert_eq!(body["connected"], false);
        assert_eq!(body["error"], "Not connected to FLDIGI");
    }

    #[tokio::test]
    async fn test_connect_publishes_edge() {
        let fake = Arc::new(FakeController::disconnected());
        let (app, state) = app_with(fake.clone());
        let (_, mut events) = state.broadcaster.subscribe();

        let (status, body) = post_empty(&app, "/api/connection/connect").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(fake.is_connected());
        match events.try_recv() {
            Ok(LinkEvent::Connection(event)) => assert!(event.connected),
            other => panic!("Expected connection event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported_in_body() {
        let fake = Arc::new(FakeController::disconnected());
        fake.set_reachable(false);
        let (app, _) = app_with(fake);

        let (status, body) = post_empty(&app, "/api/connection/connect").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Connection refused to 127.0.0.1:7362"));
    }

    #[tokio::test]
    async fn test_disconnect_drops_link() {
        let fake = Arc::new(FakeController::new());
        let (app, _) = app_with(fake.clone());

        let (_, body) = post_empty(&app, "/api/connection/disconnect").await;
        assert_eq!(body["success"], true);
        assert!(!fake.is_connected());

        let (status, body) = get(&app, "/api/status").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Not connected to FLDIGI");
    }

    #[tokio::test]
    async fn test_disconnect_holds_reconnect_until_connect() {
        let fake = Arc::new(FakeController::new());
        let (app, state) = app_with(fake.clone());
        let (_, mut events) = state.broadcaster.subscribe();

        post_empty(&app, "/api/connection/disconnect").await;
        assert!(state.reconnect_gate.is_held());
        match events.try_recv() {
            Ok(LinkEvent::Connection(event)) => {
                assert!(!event.connected);
                let error = event.details.and_then(|d| d.error);
                assert_eq!(error.as_deref(), Some(OPERATOR_DISCONNECT_MESSAGE));
            }
            other => panic!("Expected connection event, got {other:?}"),
        }

        let (_, body) = post_empty(&app, "/api/connection/connect").await;
        assert_eq!(body["success"], true);
        assert!(!state.reconnect_gate.is_held());
        assert!(fake.is_connected());
    }

    #[tokio::test]
    async fn test_failed_connect_still_lifts_hold() {
        let fake = Arc::new(FakeController::new());
        let (app, state) = app_with(fake.clone());

        post_empty(&app, "/api/connection/disconnect").await;
        fake.set_reachable(false);
        let (_, body) = post_empty(&app, "/api/connection/connect").await;
        assert_eq!(body["success"], false);
        assert!(!state.reconnect_gate.is_held());
    }

    #[tokio::test]
    async fn test_full_status_snapshot() {
        let (app, _) = app_with(Arc::new(FakeController::new()));
        let (status, body) = get(&app, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["modem"], "BPSK31");
        assert_eq!(body["trxState"], "RX");
        assert_eq!(body["snr"], 12.0);
        assert_eq!(body["rstEstimate"], "449");
        assert_eq!(body["connected"], true);
    }
}
