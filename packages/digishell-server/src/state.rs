use axum::{routing::get, Router};
use chrono::Utc;
use digishell_core::{
    ChangeBroadcaster, ConnectionEvent, LinkError, LinkEvent, ModemController, ReconnectGate,
    SharedLiveTx,
};
use serde::Serialize;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{routes, sse, websocket};

pub struct AppState {
    pub link: Arc<dyn ModemController>,
    pub broadcaster: Arc<ChangeBroadcaster>,
    pub live_tx: Arc<SharedLiveTx>,
    /// Set while the operator wants the link down
    pub reconnect_gate: Arc<ReconnectGate>,
    /// Counter for generating unique connection IDs
    pub next_conn_id: AtomicU64,
}

impl AppState {
    pub fn new(link: Arc<dyn ModemController>, broadcaster: Arc<ChangeBroadcaster>) -> Self {
        let live_tx = Arc::new(SharedLiveTx::new(link.clone(), broadcaster.clone()));
        Self {
            link,
            broadcaster,
            live_tx,
            reconnect_gate: Arc::new(ReconnectGate::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Connection status replayed to a new subscriber before any live event
    pub async fn current_connection(&self) -> ConnectionEvent {
        let connected = self.link.is_connected();
        if let Some(last) = self.broadcaster.last_connection() {
            if last.connected == connected {
                return last;
            }
        }
        if connected {
            ConnectionEvent::connected(self.link.version().await.ok(), self.link.name().await.ok())
        } else {
            ConnectionEvent::lost(LinkError::NotConnected.to_string())
        }
    }
}

/// `{success, message}` body returned by every action endpoint
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

impl StatusResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Serialize an event as the `{type, data, timestamp}` envelope pushed to clients
pub fn envelope(event: &LinkEvent) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(event)?;
    if let Some(fields) = value.as_object_mut() {
        fields.insert("timestamp".to_string(), Utc::now().to_rfc3339().into());
    }
    serde_json::to_string(&value)
}

/// Build every route. Needs `.with_state(state)`.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(websocket::ws_handler))
        .route("/events", get(sse::sse_handler))
        .merge(routes::connection::routes())
        .merge(routes::modem::routes())
        .merge(routes::txrx::routes())
        .merge(routes::rig::routes())
        .merge(routes::settings::routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}


#[cfg(test)]
mod tests {
    use super::*;
    use digishell_core::testing::FakeController;
    use digishell_core::{Notice, CONNECTION_LOST_MESSAGE};

    #[test]
    fn test_envelope_shape() {
        let json = envelope(&LinkEvent::Notice(Notice::info("hello"))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "notice");
        assert_eq!(value["data"]["message"], "hello");
        assert!(value["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_current_connection_reports_identity_when_up() {
        let link: Arc<dyn ModemController> = Arc::new(FakeController::new());
        let state = AppState::new(link, Arc::new(ChangeBroadcaster::new()));

        let event = state.current_connection().await;
        assert!(event.connected);
        let details = event.details.unwrap();
        assert_eq!(details.name.as_deref(), Some("fldigi"));
        assert_eq!(details.version.as_deref(), Some("4.2.05"));
    }

    #[tokio::test]
    async fn test_current_connection_prefers_last_published_edge() {
        let link: Arc<dyn ModemController> = Arc::new(FakeController::disconnected());
        let broadcaster = Arc::new(ChangeBroadcaster::new());
        broadcaster.publish_connection(ConnectionEvent::lost(CONNECTION_LOST_MESSAGE));
        let state = AppState::new(link, broadcaster);

        let event = state.current_connection().await;
        assert!(!event.connected);
        assert_eq!(
            event.details.and_then(|d| d.error).as_deref(),
            Some(CONNECTION_LOST_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_current_connection_ignores_stale_edge() {
        let link: Arc<dyn ModemController> = Arc::new(FakeController::disconnected());
        let broadcaster = Arc::new(ChangeBroadcaster::new());
        broadcaster.publish_connection(ConnectionEvent::connected(None, None));
        let state = AppState::new(link, broadcaster);

        let event = state.current_connection().await;
        assert!(!event.connected);
        assert_eq!(
            event.details.and_then(|d| d.error).as_deref(),
            Some("Not connected to FLDIGI")
        );
    }
}
