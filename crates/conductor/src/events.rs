//! Per-task in-memory pub/sub for live streaming to subscribers.
//!
//! Modeled as an owned collection of bounded channels keyed by task_id;
//! emit is non-blocking with an explicit drop-on-full policy rather than a
//! callback chain.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;

use crate::model::{Notification, TaskEvent};
use uuid::Uuid;

const DEFAULT_QUEUE_CAPACITY: usize = 100;
const DEFAULT_HISTORY_TTL_SECS: i64 = 300;

struct TaskState {
    history: Vec<TaskEvent>,
    subscribers: Vec<mpsc::Sender<TaskEvent>>,
    terminal_at: Option<DateTime<Utc>>,
}

impl TaskState {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            subscribers: Vec::new(),
            terminal_at: None,
        }
    }
}

pub struct EventBus {
    tasks: Mutex<HashMap<String, TaskState>>,
    queue_capacity: usize,
    history_ttl_secs: i64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            history_ttl_secs: DEFAULT_HISTORY_TTL_SECS,
        }
    }

    /// Appends to history, stamps nothing further (the event already
    /// carries task_id/timestamp), and pushes non-blocking to each
    /// subscriber; a full subscriber queue silently drops the new event.
    pub fn emit(&self, event: TaskEvent) {
        let task_id = event.task_id().to_string();
        let mut tasks = self.tasks.lock().unwrap();
        let state = tasks.entry(task_id).or_insert_with(TaskState::new);

        if state.history.len() >= self.queue_capacity {
            state.history.remove(0);
        }
        state.history.push(event.clone());

        if event.is_terminal() {
            state.terminal_at = Some(Utc::now());
        }

        state
            .subscribers
            .retain(|tx| tx.try_send(event.clone()).is_ok() || !tx.is_closed());
    }

    /// Returns a queue pre-populated with existing history (bounded by
    /// queue capacity; overflow truncates oldest history first).
    pub fn subscribe(&self, task_id: &str) -> mpsc::Receiver<TaskEvent> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut tasks = self.tasks.lock().unwrap();
        let state = tasks.entry(task_id.to_string()).or_insert_with(TaskState::new);

        let start = state.history.len().saturating_sub(self.queue_capacity);
        for event in &state.history[start..] {
            let _ = tx.try_send(event.clone());
        }
        state.subscribers.push(tx);
        rx
    }

    pub fn has_terminal_event(&self, task_id: &str) -> bool {
        self.tasks
            .lock()
            .unwrap()
            .get(task_id)
            .map(|s| s.history.iter().any(|e| e.is_terminal()))
            .unwrap_or(false)
    }

    /// Sweep-on-read: removes all state for tasks whose terminal event is
    /// older than `history_ttl`.
    pub fn cleanup_stale(&self) {
        let now = Utc::now();
        let ttl = self.history_ttl_secs;
        self.tasks.lock().unwrap().retain(|_, state| {
            state
                .terminal_at
                .map(|t| now - t <= Duration::seconds(ttl))
                .unwrap_or(true)
        });
    }
}

/// Per-app notification inbox, raised when a task completes with
/// `notify_on_complete` set. Bounded per app the same way task history is
/// bounded per task, so one noisy app can't grow this without limit.
const MAX_NOTIFICATIONS_PER_APP: usize = 200;

pub struct NotificationCenter {
    by_app: Mutex<HashMap<String, Vec<Notification>>>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self {
            by_app: Mutex::new(HashMap::new()),
        }
    }

    pub fn raise(
        &self,
        app_id: impl Into<String>,
        user_id: Option<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Notification {
        let app_id = app_id.into();
        let notification = Notification {
            id: Uuid::new_v4(),
            app_id: app_id.clone(),
            user_id,
            title: title.into(),
            body: body.into(),
            created_at: Utc::now(),
        };

        let mut by_app = self.by_app.lock().unwrap();
        let inbox = by_app.entry(app_id).or_default();
        inbox.push(notification.clone());
        if inbox.len() > MAX_NOTIFICATIONS_PER_APP {
            let excess = inbox.len() - MAX_NOTIFICATIONS_PER_APP;
            inbox.drain(0..excess);
        }
        notification
    }

    pub fn list_for_app(&self, app_id: &str) -> Vec<Notification> {
        self.by_app.lock().unwrap().get(app_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn started(task_id: &str) -> TaskEvent {
        TaskEvent::Started {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn error(task_id: &str) -> TaskEvent {
        TaskEvent::Error {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            message: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn new_subscriber_gets_history_snapshot() {
        let bus = EventBus::new();
        bus.emit(started("t1"));
        let mut rx = bus.subscribe("t1");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "started");
    }

    #[test]
    fn terminal_event_flips_has_terminal_event() {
        let bus = EventBus::new();
        bus.emit(started("t1"));
        assert!(!bus.has_terminal_event("t1"));
        bus.emit(error("t1"));
        assert!(bus.has_terminal_event("t1"));
    }

    #[test]
    fn notification_center_scopes_by_app() {
        let center = NotificationCenter::new();
        center.raise("app1", None, "done", "your task finished");
        center.raise("app2", None, "done", "unrelated");

        let inbox = center.list_for_app("app1");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title, "done");
        assert!(center.list_for_app("app3").is_empty());
    }
}
