//! `X-Api-Key` resolves an `App`; `X-User-Id` optionally resolves a
//! `UserProfile`. Required on task endpoints, optional elsewhere. An
//! unknown or missing key is 401; a key belonging to an inactive app is
//! 403. Resolved identity is attached to request extensions for handlers
//! to read.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use conductor::model::{App, UserProfile};

use crate::state::AppState;

#[derive(Clone)]
pub struct Identity {
    pub app: App,
    pub user: Option<UserProfile>,
}

const UNAUTHENTICATED_PATHS: &[&str] = &["/health"];

pub async fn check_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if UNAUTHENTICATED_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let api_key = request
        .headers()
        .get("X-Api-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    let app = state
        .store
        .get_app_by_api_key(&api_key)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !app.is_active {
        return Err(StatusCode::FORBIDDEN);
    }

    let user_id = request
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let user = match user_id {
        Some(id) => state
            .store
            .get_user_profile(&id)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        None => None,
    };

    request.extensions_mut().insert(Identity { app, user });
    Ok(next.run(request).await)
}
