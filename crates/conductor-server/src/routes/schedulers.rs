use std::time::Duration;

use chrono::Utc;
use conductor::heartbeat::HeartbeatScheduler;
use conductor::model::{HeartbeatRun, HeartbeatRunStatus, TaskRequest};
use uuid::Uuid;

use crate::configuration::Settings;
use crate::state::AppState;

/// Spawns the one genuinely time-driven background loop: the heartbeat
/// ticker. Event bus, task manager and approval expiry all sweep
/// opportunistically on read, so they need no timer of their own here.
pub fn spawn_background_loops(state: AppState, settings: &Settings) {
    let interval_secs = settings.autonomic.heartbeat_interval_secs.max(1);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            tick_heartbeats(&state).await;
        }
    });
}

async fn tick_heartbeats(state: &AppState) {
    let scheduler = HeartbeatScheduler::new(&state.heartbeats);
    let now = Utc::now();

    for (heartbeat, query, scheduled_at) in scheduler.due_heartbeats(now) {
        let task_id = Uuid::new_v4();
        let request = TaskRequest {
            id: task_id,
            query,
            context: None,
            preferences: None,
        };

        let outcome = state
            .conductor
            .execute_task(&request, &heartbeat.app_id, heartbeat.user_id.as_deref())
            .await;

        let (status, error_message) = match outcome {
            Ok(conductor::ConductorOutcome::Response(_)) | Ok(conductor::ConductorOutcome::Plan(_)) => {
                (HeartbeatRunStatus::Completed, None)
            }
            Err(err) => (HeartbeatRunStatus::Failed, Some(err.to_string())),
        };

        let run = HeartbeatRun {
            id: Uuid::new_v4(),
            heartbeat_id: heartbeat.id,
            task_id: Some(task_id),
            status,
            started_at: Some(scheduled_at),
            completed_at: Some(Utc::now()),
            error_message,
            created_at: Utc::now(),
        };

        if let Err(err) = state.store.record_heartbeat_run(&run).await {
            tracing::warn!(error = %err, heartbeat_id = %heartbeat.id, "failed to persist heartbeat run");
        }

        if !scheduler.finish_run(&heartbeat, &run).await {
            tracing::warn!(heartbeat_id = %heartbeat.id, "heartbeat webhook delivery failed");
        }
    }
}
