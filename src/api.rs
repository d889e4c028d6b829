//! REST surface
//!
//! Zone configuration comes from the store; on read it is merged with the live zone map.
//! Hardware actions return the raw RadioRA reply as `{"lutron": "<reply>"}`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use error_stack::Report;
use log::{debug, error};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::command_payload::{RaCommand, Switch};
use crate::gateway::RaGateway;
use crate::get_version;
use crate::ra_manager::RaManagerError;
use crate::zone_payload::{Zone, ZoneCreate, ZoneType, ZoneUpdate};
use crate::zone_state::merge_zone_states;
use crate::zone_store::{StoreError, ZoneStore};

#[derive(Clone)]
pub struct AppState {
    pub gateway: RaGateway,
    pub store: ZoneStore,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    ZoneNotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    SerialTimeout(String),

    #[error("{0}")]
    SerialDesync(String),

    #[error("{0}")]
    MalformedStatusFrame(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::ZoneNotFound(_) => (StatusCode::NOT_FOUND, "zone_not_found"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::SerialTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "serial_timeout"),
            ApiError::SerialDesync(_) => (StatusCode::BAD_GATEWAY, "serial_desync"),
            ApiError::MalformedStatusFrame(_) => (StatusCode::BAD_GATEWAY, "malformed_status_frame"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "queue_closed"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!("{}: {}", code, self);
        }

        (status, Json(ErrorBody { code, message: self.to_string() })).into_response()
    }
}

impl From<Report<RaManagerError>> for ApiError {
    fn from(report: Report<RaManagerError>) -> Self {
        let message = report.current_context().to_string();

        match report.current_context() {
            RaManagerError::InvalidZone(_) | RaManagerError::InvalidLevel(_) => ApiError::InvalidRequest(message),
            RaManagerError::SerialTimeout(_) => ApiError::SerialTimeout(message),
            RaManagerError::SerialDesync { .. } => ApiError::SerialDesync(message),
            RaManagerError::MalformedStatusFrame { .. } => ApiError::MalformedStatusFrame(message),
            RaManagerError::QueueClosed => ApiError::Unavailable(message),
            RaManagerError::Uart(_) | RaManagerError::Context(_) => ApiError::Internal(format!("{report:?}")),
        }
    }
}

impl From<Report<StoreError>> for ApiError {
    fn from(report: Report<StoreError>) -> Self {
        let message = report.current_context().to_string();

        match report.current_context() {
            StoreError::ZoneNotFound(_) => ApiError::ZoneNotFound(message),
            StoreError::DuplicateZoneNumber(_) => ApiError::Conflict(message),
            StoreError::InvalidZone(_) | StoreError::InvalidZoneType(_) | StoreError::InvalidLevel(_) => {
                ApiError::InvalidRequest(message)
            }
            StoreError::Database(_) | StoreError::Migration | StoreError::Context(_) => {
                ApiError::Internal(format!("{report:?}"))
            }
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct LutronReply {
    lutron: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/zones", get(list_zones).post(create_zone))
        .route("/zones/", get(list_zones).post(create_zone))
        .route("/zones/{id}", get(get_zone).put(update_zone).delete(delete_zone))
        .route("/zones/{id}/dim/{level}", get(dim_zone))
        .route("/zones/{id}/switch/on", get(switch_zone_on))
        .route("/zones/{id}/switch/off", get(switch_zone_off))
        .route("/zones/all/on", get(all_on))
        .route("/zones/all/off", get(all_off))
        .route("/zones/all/flash/on", get(flash_on))
        .route("/zones/all/flash/off", get(flash_off))
        .route("/zonetypes", get(list_zone_types))
        .route("/zonetypes/", get(list_zone_types))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn merge_live_state(state: &AppState, zones: &mut [Zone]) -> ApiResult<()> {
    let frame = state.gateway.zone_states().await?;
    debug!("Zone map: {}", frame);
    merge_zone_states(zones, &frame)?;
    Ok(())
}

async fn hardware_action(state: &AppState, command: RaCommand) -> ApiResult<Json<LutronReply>> {
    let lutron = state.gateway.execute(command).await?;
    Ok(Json(LutronReply { lutron }))
}

async fn list_zones(State(state): State<AppState>) -> ApiResult<Json<Vec<Zone>>> {
    let mut zones = state.store.list_zones().await?;
    merge_live_state(&state, &mut zones).await?;
    Ok(Json(zones))
}

async fn get_zone(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Zone>> {
    let mut zone = state.store.get_zone(id).await?;
    merge_live_state(&state, std::slice::from_mut(&mut zone)).await?;
    Ok(Json(zone))
}

async fn create_zone(
    State(state): State<AppState>,
    Json(payload): Json<ZoneCreate>,
) -> ApiResult<(StatusCode, Json<Zone>)> {
    let zone = state.store.create_zone(payload).await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

async fn update_zone(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ZoneUpdate>,
) -> ApiResult<StatusCode> {
    state.store.update_zone(id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_zone(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    state.store.delete_zone(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn dim_zone(
    State(state): State<AppState>,
    Path((id, level)): Path<(i64, i64)>,
) -> ApiResult<Json<LutronReply>> {
    let zone = state.store.get_zone(id).await?;
    hardware_action(&state, RaCommand::dim(zone.zone, level)?).await
}

async fn switch_zone(state: &AppState, id: i64, switch: Switch) -> ApiResult<Json<LutronReply>> {
    let zone = state.store.get_zone(id).await?;
    hardware_action(state, RaCommand::switch(zone.zone, switch)?).await
}

async fn switch_zone_on(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<LutronReply>> {
    switch_zone(&state, id, Switch::On).await
}

async fn switch_zone_off(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<LutronReply>> {
    switch_zone(&state, id, Switch::Off).await
}

async fn all_on(State(state): State<AppState>) -> ApiResult<Json<LutronReply>> {
    hardware_action(&state, RaCommand::AllOn).await
}

async fn all_off(State(state): State<AppState>) -> ApiResult<Json<LutronReply>> {
    hardware_action(&state, RaCommand::AllOff).await
}

async fn flash_on(State(state): State<AppState>) -> ApiResult<Json<LutronReply>> {
    hardware_action(&state, RaCommand::FlashOn).await
}

async fn flash_off(State(state): State<AppState>) -> ApiResult<Json<LutronReply>> {
    hardware_action(&state, RaCommand::FlashOff).await
}

async fn list_zone_types(State(state): State<AppState>) -> ApiResult<Json<Vec<ZoneType>>> {
    Ok(Json(state.store.list_zone_types().await?))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": get_version() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ra_emulator::RadioRaEmulator;
    use crate::ra_manager::tests::ScriptedController;
    use crate::ra_manager::{RaManager, RadioRaController, RetryPolicy};
    use crate::zone_store::tests::test_store;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_app(controller: impl RadioRaController + 'static) -> (Router, ZoneStore) {
        let policy = RetryPolicy {
            read_timeout: Duration::from_millis(5),
            retries: 1,
            backoff: Duration::ZERO,
        };
        let (gateway, _) = RaGateway::spawn(RaManager::new(Box::new(controller), policy), 4);

        app_with_gateway(gateway).await
    }

    async fn app_with_gateway(gateway: RaGateway) -> (Router, ZoneStore) {
        let store = test_store().await;

        (router(AppState { gateway, store: store.clone() }), store)
    }

    async fn create(store: &ZoneStore, name: &str, zone: i64, zonetypeid: i64) -> Zone {
        store
            .create_zone(ZoneCreate { name: name.to_owned(), zone, zonetypeid, default_level: 100 })
            .await
            .unwrap()
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };

        (status, json)
    }

    #[tokio::test]
    async fn test_list_zones_merges_live_state() {
        let (app, store) = test_app(RadioRaEmulator::new(&[1, 2], false)).await;
        create(&store, "Kitchen", 1, 2).await;
        create(&store, "Hall", 2, 1).await;
        create(&store, "Porch", 3, 2).await;

        send(&app, "GET", "/zones/all/on", None).await;
        send(&app, "GET", "/zones/1/switch/off", None).await;
        let (status, json) = send(&app, "GET", "/zones/", None).await;

        assert_eq!(status, StatusCode::OK);
        let zones = json.as_array().unwrap();
        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0]["state"], "off");
        assert_eq!(zones[0]["zonetypeid"], 2);
        assert_eq!(zones[1]["state"], "on");
        assert_eq!(zones[1]["zonetypeid"], 1);
        // Zone 3 is not wired
        assert_eq!(zones[2]["state"], "Unknown");
        assert_eq!(zones[2]["zonetypeid"], 0);
    }

    #[tokio::test]
    async fn test_get_zone() {
        let (app, store) = test_app(RadioRaEmulator::new(&[4], false)).await;
        let zone = create(&store, "Den", 4, 2).await;

        let (status, json) = send(&app, "GET", &format!("/zones/{}", zone.id), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "Den");
        assert_eq!(json["state"], "off");
    }

    #[tokio::test]
    async fn test_get_missing_zone() {
        let (app, _) = test_app(RadioRaEmulator::new(&[1], false)).await;

        let (status, json) = send(&app, "GET", "/zones/77", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "zone_not_found");
    }

    #[tokio::test]
    async fn test_update_zone() {
        let (app, store) = test_app(RadioRaEmulator::new(&[1], false)).await;
        let zone = create(&store, "Den", 1, 2).await;

        let body = serde_json::json!({ "name": "Study", "zonetypeid": 1, "default_level": 60 });
        let (status, _) = send(&app, "PUT", &format!("/zones/{}", zone.id), Some(body)).await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        let updated = store.get_zone(zone.id).await.unwrap();
        assert_eq!(updated.name, "Study");
        assert_eq!(updated.zonetypeid, 1);
        assert_eq!(updated.default_level, 60);
    }

    #[tokio::test]
    async fn test_update_invalid_zone_type() {
        let (app, store) = test_app(RadioRaEmulator::new(&[1], false)).await;
        let zone = create(&store, "Den", 1, 2).await;

        let body = serde_json::json!({ "zonetypeid": 7 });
        let (status, json) = send(&app, "PUT", &format!("/zones/{}", zone.id), Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_create_and_delete_zone() {
        let (app, _) = test_app(RadioRaEmulator::new(&[1], false)).await;

        let body = serde_json::json!({ "name": "Garage", "zone": 9 });
        let (status, json) = send(&app, "POST", "/zones/", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["zonetypeid"], 2);

        let (status, _) = send(&app, "POST", "/zones/", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let id = json["id"].as_i64().unwrap();
        let (status, _) = send(&app, "DELETE", &format!("/zones/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_dim_returns_raw_reply() {
        let (app, store) = test_app(RadioRaEmulator::new(&[1, 2, 3], false)).await;
        let zone = create(&store, "Dining", 3, 2).await;

        let (status, json) = send(&app, "GET", &format!("/zones/{}/dim/40", zone.id), None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(json["lutron"].as_str().unwrap().starts_with("ZMP001X"));
    }

    #[tokio::test]
    async fn test_dim_level_out_of_range() {
        let (app, store) = test_app(RadioRaEmulator::new(&[1], false)).await;
        let zone = create(&store, "Dining", 1, 2).await;

        let (status, json) = send(&app, "GET", &format!("/zones/{}/dim/140", zone.id), None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_broadcast_endpoints() {
        let (app, _) = test_app(RadioRaEmulator::new(&[1, 2], false)).await;

        let (_, json) = send(&app, "GET", "/zones/all/on", None).await;
        assert!(json["lutron"].as_str().unwrap().starts_with("ZMP11X"));

        let (_, json) = send(&app, "GET", "/zones/all/off", None).await;
        assert!(json["lutron"].as_str().unwrap().starts_with("ZMP00X"));

        for uri in ["/zones/all/flash/on", "/zones/all/flash/off"] {
            let (status, json) = send(&app, "GET", uri, None).await;
            assert_eq!(status, StatusCode::OK);
            assert!(json["lutron"].is_string());
        }
    }

    #[tokio::test]
    async fn test_serial_timeout() {
        let (app, store) = test_app(RadioRaEmulator::new(&[1], false).with_dropped_replies(10)).await;
        create(&store, "Kitchen", 1, 2).await;

        let (status, json) = send(&app, "GET", "/zones/", None).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json["code"], "serial_timeout");
    }

    #[tokio::test]
    async fn test_out_of_sync_reply() {
        let (controller, _) = ScriptedController::new(vec![Some("~ERROR")]);
        let (app, store) = test_app(controller).await;
        create(&store, "Kitchen", 1, 2).await;

        let (status, json) = send(&app, "GET", "/zones/", None).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["code"], "serial_desync");
    }

    #[tokio::test]
    async fn test_short_zone_map() {
        let (controller, _) = ScriptedController::new(vec![Some("ZMP0")]);
        let (app, store) = test_app(controller).await;
        let zone = create(&store, "Porch", 5, 2).await;

        let (status, json) = send(&app, "GET", &format!("/zones/{}", zone.id), None).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["code"], "malformed_status_frame");
    }

    #[tokio::test]
    async fn test_stopped_queue() {
        let (app, store) = app_with_gateway(RaGateway::closed()).await;
        create(&store, "Kitchen", 1, 2).await;

        let (status, json) = send(&app, "GET", "/zones/", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["code"], "queue_closed");

        let (status, json) = send(&app, "GET", "/zones/all/on", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["code"], "queue_closed");
    }

    #[tokio::test]
    async fn test_zone_types() {
        let (app, _) = test_app(RadioRaEmulator::new(&[1], false)).await;

        let (status, json) = send(&app, "GET", "/zonetypes/", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 4);
        assert_eq!(json[0]["name"], "Unassigned");
    }
}
