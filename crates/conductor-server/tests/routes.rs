use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware;
use conductor::model::App;
use conductor_server::auth::check_api_key;
use conductor_server::routes;
use conductor_server::state::AppState;
use http::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_app() -> (axum::Router, App) {
    let state = AppState::new().expect("app state builds");
    let app = App {
        id: "app-1".to_string(),
        name: "test app".to_string(),
        api_key: "test-key".to_string(),
        is_active: true,
    };
    state.store.upsert_app(&app).await.expect("seed app");

    let router = routes::configure(state.clone())
        .layer(middleware::from_fn_with_state(state, check_api_key));

    (router, app)
}

#[tokio::test]
async fn health_requires_no_api_key() {
    let (router, _) = test_app().await;

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn task_submission_without_api_key_is_unauthorized() {
    let (router, _) = test_app().await;

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tasks")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "query": "what time is it" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn task_submission_with_valid_api_key_completes() {
    let (router, app) = test_app().await;

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tasks")
                .header(CONTENT_TYPE, "application/json")
                .header("X-Api-Key", app.api_key.clone())
                .body(Body::from(json!({ "query": "take a quick note: buy milk" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body.get("task_id").is_some());
}

#[tokio::test]
async fn unknown_room_lookup_on_deregister_returns_not_ok() {
    let (router, app) = test_app().await;

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rooms/deregister")
                .header(CONTENT_TYPE, "application/json")
                .header("X-Api-Key", app.api_key.clone())
                .body(Body::from(json!({ "room_id": "nonexistent" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], json!(false));
}
