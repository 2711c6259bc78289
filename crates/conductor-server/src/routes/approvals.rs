use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use conductor::model::ApprovalRequest;
use serde::Deserialize;
use uuid::Uuid;

use crate::routes::errors::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/approvals/{id}", post(resolve))
}

#[derive(Deserialize)]
struct ResolveRequest {
    approved: bool,
    resolved_by: String,
}

async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ApprovalRequest>, ApiError> {
    let resolved = state
        .conductor
        .approvals()
        .resolve(id, request.approved, request.resolved_by, Utc::now())?;
    Ok(Json(resolved))
}
