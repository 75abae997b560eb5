use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use digishell_core::BoolSetting;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, StatusResponse};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/settings/squelch-level",
            get(get_squelch_level).post(set_squelch_level),
        )
        .route("/api/settings/{name}", get(get_switch).post(set_switch))
}

fn parse_setting(name: &str) -> ApiResult<BoolSetting> {
    name.parse().map_err(ApiError::NotFound)
}

#[derive(Debug, Serialize, Deserialize)]
struct Switch {
    enabled: bool,
}

async fn get_switch(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Switch>> {
    let setting = parse_setting(&name)?;
    Ok(Json(Switch {
        enabled: state.link.bool_setting(setting).await?,
    }))
}

async fn set_switch(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<Switch>,
) -> ApiResult<Json<StatusResponse>> {
    let setting = parse_setting(&name)?;
    state.link.set_bool_setting(setting, request.enabled).await?;
    let verb = if request.enabled { "enabled" } else { "disabled" };
    Ok(Json(StatusResponse::ok(format!("{} {verb}", setting.label()))))
}

#[derive(Debug, Serialize, Deserialize)]
struct Level {
    value: f64,
}

async fn get_squelch_level(State(state): State<Arc<AppState>>) -> ApiResult<Json<Level>> {
    Ok(Json(Level {
        value: state.link.squelch_level().await?,
    }))
}

async fn set_squelch_level(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Level>,
) -> ApiResult<Json<StatusResponse>> {
    if !request.value.is_finite() {
        return Err(ApiError::BadRequest("squelch level must be a number".to_string()));
    }
    state.link.set_squelch_level(request.value).await?;
    let applied = request.value.clamp(0.0, 1.0);
    Ok(Json(StatusResponse::ok(format!(
        "Squelch level set to {applied:.2}"
    ))))
}

#[cfg(test)]
mod tests {
    use crate::state::test_support::{app_with, get, post};
    use axum::http::StatusCode;
    use digishell_core::testing::FakeController;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_switch_round_trip() {
        let (app, _) = app_with(Arc::new(FakeController::new()));

        let (_, body) = get(&app, "/api/settings/afc").await;
        assert_eq!(body["enabled"], false);

        let (status, body) = post(&app, "/api/settings/afc", json!({"enabled": true})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "AFC enabled");

        let (_, body) = get(&app, "/api/settings/afc").await;
        assert_eq!(body["enabled"], true);
        let (_, body) = get(&app, "/api/settings/txid").await;
        assert_eq!(body["enabled"], false);
    }

    #[tokio::test]
    async fn test_unknown_setting_is_not_found() {
        let (app, _) = app_with(Arc::new(FakeController::new()));
        let (status, body) = get(&app, "/api/settings/waterfall").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "unknown setting: waterfall");
    }

    #[tokio::test]
    async fn test_squelch_level_is_clamped() {
        let (app, _) = app_with(Arc::new(FakeController::new()));

        let (status, body) =
            post(&app, "/api/settings/squelch-level", json!({"value": 1.7})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Squelch level set to 1.00");

        let (_, body) = get(&app, "/api/settings/squelch-level").await;
        assert_eq!(body["value"], 1.0);
    }

    #[tokio::test]
    async fn test_settings_require_connection() {
        let (app, _) = app_with(Arc::new(FakeController::disconnected()));
        let (status, _) = post(&app, "/api/settings/rsid", json!({"enabled": true})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
