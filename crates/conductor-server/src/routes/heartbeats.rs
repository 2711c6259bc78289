use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use conductor::model::{Heartbeat, HeartbeatCreate, HeartbeatUpdate};

use crate::auth::Identity;
use crate::routes::errors::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/heartbeats", post(create).get(list))
        .route("/heartbeats/{id}", patch(update).delete(delete))
}

async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(create): Json<HeartbeatCreate>,
) -> Result<Json<Heartbeat>, ApiError> {
    let user_id = identity.user.map(|u| u.id);
    let heartbeat = state.heartbeats.create(identity.app.id, user_id, create)?;
    Ok(Json(heartbeat))
}

async fn list(State(state): State<AppState>, Extension(identity): Extension<Identity>) -> Json<Vec<Heartbeat>> {
    Json(state.heartbeats.list(&identity.app.id))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(update): Json<HeartbeatUpdate>,
) -> Result<Json<Heartbeat>, ApiError> {
    Ok(Json(state.heartbeats.update(id, update)?))
}

async fn delete(State(state): State<AppState>, Path(id): Path<uuid::Uuid>) -> StatusCode {
    if state.heartbeats.delete(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
