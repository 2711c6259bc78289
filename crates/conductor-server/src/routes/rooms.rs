use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use conductor::model::{RoomHeartbeat, RoomInfo, RoomRegistration};
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rooms/register", post(register))
        .route("/rooms/deregister", post(deregister))
        .route("/rooms/heartbeat", post(heartbeat))
}

async fn register(
    State(state): State<AppState>,
    Json(registration): Json<RoomRegistration>,
) -> Json<RoomInfo> {
    Json(state.conductor.rooms().register(registration))
}

#[derive(Deserialize)]
struct DeregisterRequest {
    room_id: String,
}

async fn deregister(
    State(state): State<AppState>,
    Json(request): Json<DeregisterRequest>,
) -> Json<serde_json::Value> {
    let ok = state.conductor.rooms().deregister(&request.room_id);
    Json(json!({ "ok": ok }))
}

async fn heartbeat(
    State(state): State<AppState>,
    Json(heartbeat): Json<RoomHeartbeat>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if state.conductor.rooms().heartbeat(heartbeat) {
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}
