pub mod approvals;
pub mod errors;
pub mod health;
pub mod heartbeats;
pub mod knowledge;
pub mod rooms;
pub mod schedulers;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(tasks::routes())
        .merge(rooms::routes())
        .merge(heartbeats::routes())
        .merge(knowledge::routes())
        .merge(approvals::routes())
        .with_state(state)
}
