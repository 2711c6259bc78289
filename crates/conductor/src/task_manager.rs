//! Tracks in-flight task lifecycle independent of the Event Bus's
//! pub/sub history: registration, progress, completion, and cooperative
//! cancellation.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{ConductorError, ConductorResult};
use crate::model::{TaskResponse, TaskStatus};

const DEFAULT_STALE_AFTER_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelState {
    None,
    Cancelling,
    Cancelled,
}

#[derive(Debug, Clone)]
struct TaskRecord {
    status: TaskStatus,
    progress: Option<String>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    response: Option<TaskResponse>,
    error: Option<String>,
    cancel_state: CancelState,
}

pub struct TaskManager {
    tasks: Mutex<HashMap<String, TaskRecord>>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, task_id: Uuid) {
        let now = Utc::now();
        self.tasks.lock().unwrap().insert(
            task_id.to_string(),
            TaskRecord {
                status: TaskStatus::Pending,
                progress: None,
                started_at: now,
                updated_at: now,
                response: None,
                error: None,
                cancel_state: CancelState::None,
            },
        );
    }

    pub fn start(&self, task_id: &str) {
        self.with_record_mut(task_id, |record| {
            record.status = TaskStatus::Running;
            record.updated_at = Utc::now();
        });
    }

    pub fn update_progress(&self, task_id: &str, progress: impl Into<String>) {
        self.with_record_mut(task_id, |record| {
            record.progress = Some(progress.into());
            record.updated_at = Utc::now();
        });
    }

    pub fn complete(&self, task_id: &str, response: TaskResponse) {
        self.with_record_mut(task_id, |record| {
            record.status = TaskStatus::Complete;
            record.response = Some(response);
            record.updated_at = Utc::now();
        });
    }

    pub fn fail(&self, task_id: &str, error: impl Into<String>) {
        self.with_record_mut(task_id, |record| {
            record.status = TaskStatus::Failed;
            record.error = Some(error.into());
            record.updated_at = Utc::now();
        });
    }

    /// Requests cancellation; the running execution must poll
    /// `is_cancelling` and call `mark_cancelled` once it has actually
    /// stopped.
    pub fn cancel(&self, task_id: &str) -> ConductorResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(task_id) {
            Some(record) if record.status == TaskStatus::Running => {
                record.cancel_state = CancelState::Cancelling;
                record.updated_at = Utc::now();
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(ConductorError::TaskNotFound(task_id.to_string())),
        }
    }

    pub fn is_cancelling(&self, task_id: &str) -> bool {
        self.tasks
            .lock()
            .unwrap()
            .get(task_id)
            .map(|r| r.cancel_state == CancelState::Cancelling)
            .unwrap_or(false)
    }

    pub fn mark_cancelled(&self, task_id: &str) {
        self.with_record_mut(task_id, |record| {
            record.status = TaskStatus::Failed;
            record.error = Some("cancelled".to_string());
            record.cancel_state = CancelState::Cancelled;
            record.updated_at = Utc::now();
        });
    }

    pub fn get(&self, task_id: &str) -> Option<(TaskStatus, Option<String>, DateTime<Utc>)> {
        self.tasks
            .lock()
            .unwrap()
            .get(task_id)
            .map(|r| (r.status, r.progress.clone(), r.started_at))
    }

    pub fn get_response(&self, task_id: &str) -> Option<TaskResponse> {
        self.tasks
            .lock()
            .unwrap()
            .get(task_id)
            .and_then(|r| r.response.clone())
    }

    pub fn get_active(&self) -> Vec<String> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| matches!(r.status, TaskStatus::Pending | TaskStatus::Running))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Sweep-on-read: drops terminal tasks whose last update predates
    /// `stale_after`.
    pub fn cleanup_old(&self) {
        let now = Utc::now();
        self.tasks.lock().unwrap().retain(|_, record| {
            let terminal = matches!(record.status, TaskStatus::Complete | TaskStatus::Failed);
            !terminal || now - record.updated_at <= Duration::seconds(DEFAULT_STALE_AFTER_SECS)
        });
    }

    fn with_record_mut(&self, task_id: &str, f: impl FnOnce(&mut TaskRecord)) {
        if let Some(record) = self.tasks.lock().unwrap().get_mut(task_id) {
            f(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionMetadata, Outcome, ProcessType};

    fn response() -> TaskResponse {
        TaskResponse {
            request_id: Uuid::new_v4(),
            outcome: Outcome::Complete,
            findings: Vec::new(),
            summary: "done".to_string(),
            confidence: 0.9,
            metadata: ExecutionMetadata {
                instrument_used: "note".to_string(),
                iterations: 1,
                duration_ms: 1,
                sources_consulted: Vec::new(),
                process_type: ProcessType::Autonomic,
                room_id: None,
            },
            discrepancy: None,
            suggested_followups: Vec::new(),
        }
    }

    #[test]
    fn lifecycle_register_start_complete() {
        let manager = TaskManager::new();
        let id = Uuid::new_v4();
        manager.register(id);
        assert_eq!(manager.get(&id.to_string()).unwrap().0, TaskStatus::Pending);
        manager.start(&id.to_string());
        assert_eq!(manager.get(&id.to_string()).unwrap().0, TaskStatus::Running);
        manager.complete(&id.to_string(), response());
        assert_eq!(manager.get(&id.to_string()).unwrap().0, TaskStatus::Complete);
        assert!(manager.get_response(&id.to_string()).is_some());
    }

    #[test]
    fn cancel_only_applies_while_running() {
        let manager = TaskManager::new();
        let id = Uuid::new_v4();
        manager.register(id);
        manager.cancel(&id.to_string()).unwrap();
        assert!(!manager.is_cancelling(&id.to_string()));
        manager.start(&id.to_string());
        manager.cancel(&id.to_string()).unwrap();
        assert!(manager.is_cancelling(&id.to_string()));
        manager.mark_cancelled(&id.to_string());
        assert_eq!(manager.get(&id.to_string()).unwrap().0, TaskStatus::Failed);
    }

    #[test]
    fn cancel_unknown_task_errors() {
        let manager = TaskManager::new();
        assert!(manager.cancel("ghost").is_err());
    }

    #[test]
    fn get_active_excludes_terminal_tasks() {
        let manager = TaskManager::new();
        let running = Uuid::new_v4();
        let done = Uuid::new_v4();
        manager.register(running);
        manager.register(done);
        manager.start(&running.to_string());
        manager.complete(&done.to_string(), response());
        let active = manager.get_active();
        assert_eq!(active, vec![running.to_string()]);
    }
}
