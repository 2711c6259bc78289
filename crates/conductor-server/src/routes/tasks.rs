//! `POST /tasks`, `GET /tasks/{id}`, `POST /tasks/{id}/cancel`,
//! `GET /tasks/{id}/events`.
//!
//! Gating (privacy, routing, policy/trust) happens inline in
//! `Conductor::execute_task`, so a plan response is available
//! synchronously. The Task Manager mirrors the same lifecycle for
//! polling via `GET /tasks/{id}` once the instrument has run; this build
//! has no long-running LLM backend to stream partial iterations against
//! (see DESIGN.md), so execution completes within the same request.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use conductor::model::{TaskPendingResponse, TaskRequest, TaskSubmitResponse, TaskStatus};
use conductor::ConductorOutcome;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::Identity;
use crate::routes::errors::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(submit_task))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/tasks/{id}/events", get(task_events))
}

async fn submit_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<TaskSubmitResponse>, ApiError> {
    let task_id = request.id;
    let user_id = identity.user.as_ref().map(|u| u.id.as_str());

    state.tasks.register(task_id);
    state.tasks.start(&task_id.to_string());

    match state
        .conductor
        .execute_task(&request, &identity.app.id, user_id)
        .await
    {
        Ok(ConductorOutcome::Plan(plan)) => Ok(Json(plan)),
        Ok(ConductorOutcome::Response(response)) => {
            state.tasks.complete(&task_id.to_string(), response);
            Ok(Json(TaskSubmitResponse {
                task_id,
                status: TaskStatus::Complete,
                message: "task complete".to_string(),
                plan: None,
            }))
        }
        Err(err) => {
            state.tasks.fail(&task_id.to_string(), err.to_string());
            Err(err.into())
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum TaskStatusResponse {
    Done(Box<conductor::model::TaskResponse>),
    Pending(TaskPendingResponse),
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, StatusCode> {
    let (status, progress, started_at) = state.tasks.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    if status == TaskStatus::Complete {
        if let Some(response) = state.tasks.get_response(&id) {
            return Ok(Json(TaskStatusResponse::Done(Box::new(response))));
        }
    }

    let task_id = id.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(TaskStatusResponse::Pending(TaskPendingResponse {
        task_id,
        status,
        progress,
        started_at: Some(started_at),
    })))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.tasks.cancel(&id)?;
    let cancelled = state.tasks.is_cancelling(&id);
    Ok(Json(json!({ "cancelled": cancelled })))
}

/// Formats `TaskEvent`s as `event: <name>\ndata: <json>\n\n` and closes the
/// stream after the first terminal event.
struct SseResponse {
    rx: Pin<Box<dyn Stream<Item = String> + Send>>,
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.as_mut().poll_next(cx).map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let body = axum::body::Body::from_stream(self);
        axum::http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .body(body)
            .unwrap()
    }
}

async fn task_events(State(state): State<AppState>, Path(id): Path<String>) -> SseResponse {
    let rx = state.conductor.events().subscribe(&id);
    let formatted = ReceiverStream::new(rx).scan(false, |closed, event| {
        if *closed {
            return std::future::ready(None);
        }
        *closed = event.is_terminal();
        let name = event.name();
        let data = serde_json::to_string(&event).unwrap_or_default();
        std::future::ready(Some(format!("event: {name}\ndata: {data}\n\n")))
    });
    SseResponse {
        rx: Box::pin(formatted),
    }
}
