use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use conductor::model::{KnowledgeSyncPush, RoomLearningBatch};
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/knowledge/sync/{room_id}", post(sync))
        .route("/knowledge/learnings", post(learnings))
}

#[derive(Deserialize)]
struct SyncRequest {
    #[serde(default)]
    last_synced_version: Option<u64>,
}

async fn sync(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(request): Json<SyncRequest>,
) -> Json<KnowledgeSyncPush> {
    let last_synced = request
        .last_synced_version
        .unwrap_or_else(|| state.knowledge.last_synced_version(&room_id));
    Json(state.knowledge.get_sync_push(&room_id, last_synced))
}

async fn learnings(
    State(state): State<AppState>,
    Json(batch): Json<RoomLearningBatch>,
) -> Json<serde_json::Value> {
    let count = batch.learnings.len();
    state.knowledge.accept_learnings(batch);
    state.knowledge.aggregate_learnings();
    Json(json!({ "stored": count }))
}
