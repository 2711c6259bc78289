//! Scheduled, recurring task triggers. `HeartbeatScheduler::tick` is
//! driven by an external interval (the server binary owns the timer);
//! this module only computes due-ness and expands templates.
//!
//! Timezone handling is UTC-only: `Heartbeat::timezone` is carried through
//! the model and the API but schedules are currently evaluated against
//! `Utc::now()` regardless of its value.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, Utc};
use cron::Schedule;
use uuid::Uuid;

use crate::error::{ConductorError, ConductorResult};
use crate::model::{Heartbeat, HeartbeatCreate, HeartbeatRun, HeartbeatRunStatus, HeartbeatUpdate};

const WEBHOOK_TIMEOUT_SECS: u64 = 30;

pub struct HeartbeatStore {
    heartbeats: Mutex<HashMap<Uuid, Heartbeat>>,
    running: Mutex<HashSet<Uuid>>,
}

impl Default for HeartbeatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatStore {
    pub fn new() -> Self {
        Self {
            heartbeats: Mutex::new(HashMap::new()),
            running: Mutex::new(HashSet::new()),
        }
    }

    pub fn create(&self, app_id: String, user_id: Option<String>, create: HeartbeatCreate) -> ConductorResult<Heartbeat> {
        Schedule::from_str(&create.cron_expression)
            .map_err(|e| ConductorError::InvalidInput(format!("invalid cron expression: {e}")))?;

        let now = Utc::now();
        let heartbeat = Heartbeat {
            id: Uuid::new_v4(),
            app_id,
            user_id,
            name: create.name,
            query_template: create.query_template,
            cron_expression: create.cron_expression,
            timezone: create.timezone,
            is_active: true,
            context_template: create.context_template,
            webhook_url: create.webhook_url,
            created_at: now,
            updated_at: now,
            last_successful_run_at: None,
        };
        self.heartbeats.lock().unwrap().insert(heartbeat.id, heartbeat.clone());
        Ok(heartbeat)
    }

    pub fn update(&self, id: Uuid, update: HeartbeatUpdate) -> ConductorResult<Heartbeat> {
        if let Some(expr) = &update.cron_expression {
            Schedule::from_str(expr)
                .map_err(|e| ConductorError::InvalidInput(format!("invalid cron expression: {e}")))?;
        }
        let mut heartbeats = self.heartbeats.lock().unwrap();
        let heartbeat = heartbeats
            .get_mut(&id)
            .ok_or_else(|| ConductorError::TaskNotFound(id.to_string()))?;

        if let Some(name) = update.name {
            heartbeat.name = name;
        }
        if let Some(query_template) = update.query_template {
            heartbeat.query_template = query_template;
        }
        if let Some(cron_expression) = update.cron_expression {
            heartbeat.cron_expression = cron_expression;
        }
        if let Some(timezone) = update.timezone {
            heartbeat.timezone = timezone;
        }
        if let Some(is_active) = update.is_active {
            heartbeat.is_active = is_active;
        }
        if let Some(context_template) = update.context_template {
            heartbeat.context_template = context_template;
        }
        if let Some(webhook_url) = update.webhook_url {
            heartbeat.webhook_url = Some(webhook_url);
        }
        heartbeat.updated_at = Utc::now();
        Ok(heartbeat.clone())
    }

    pub fn delete(&self, id: Uuid) -> bool {
        self.heartbeats.lock().unwrap().remove(&id).is_some()
    }

    pub fn get(&self, id: Uuid) -> Option<Heartbeat> {
        self.heartbeats.lock().unwrap().get(&id).cloned()
    }

    pub fn list(&self, app_id: &str) -> Vec<Heartbeat> {
        self.heartbeats
            .lock()
            .unwrap()
            .values()
            .filter(|h| h.app_id == app_id)
            .cloned()
            .collect()
    }

    fn record_success(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(heartbeat) = self.heartbeats.lock().unwrap().get_mut(&id) {
            heartbeat.last_successful_run_at = Some(at);
        }
    }

    /// Exclusivity lock: returns `true` if this call acquired the lock for
    /// `heartbeat_id`, meaning the caller is now responsible for releasing
    /// it via `release`.
    fn try_lock(&self, heartbeat_id: Uuid) -> bool {
        self.running.lock().unwrap().insert(heartbeat_id)
    }

    fn release(&self, heartbeat_id: Uuid) {
        self.running.lock().unwrap().remove(&heartbeat_id);
    }
}

const MAX_PREV_SCHEDULED_STEPS: u32 = 100_000;
const NO_HISTORY_GRACE_MINUTES: i64 = 5;

/// The most recent scheduled fire time at or before `now`, walking
/// forward from `anchor` (typically the heartbeat's `created_at`).
/// Bounded to avoid unbounded iteration against a malformed or
/// extremely dense schedule.
fn prev_scheduled(expr: &str, anchor: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let schedule = Schedule::from_str(expr).ok()?;
    let mut last = None;
    let mut cursor = anchor;
    for _ in 0..MAX_PREV_SCHEDULED_STEPS {
        let Some(next) = schedule.after(&cursor).next() else {
            break;
        };
        if next > now {
            break;
        }
        last = Some(next);
        cursor = next;
    }
    last
}

/// A heartbeat is due when either no successful run exists yet and the
/// most recent scheduled fire is within `NO_HISTORY_GRACE_MINUTES` of
/// `now`, or the last successful run predates that scheduled fire.
pub fn is_due(heartbeat: &Heartbeat, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !heartbeat.is_active {
        return None;
    }
    // Anchoring at the later of created_at/last_successful_run_at keeps the
    // forward walk in `prev_scheduled` bounded by elapsed-since-last-tick
    // rather than elapsed-since-creation.
    let anchor = match heartbeat.last_successful_run_at {
        Some(last_run) if last_run > heartbeat.created_at => last_run,
        _ => heartbeat.created_at,
    };
    let scheduled = prev_scheduled(&heartbeat.cron_expression, anchor, now)?;
    match heartbeat.last_successful_run_at {
        Some(last_run) if scheduled > last_run => Some(scheduled),
        Some(_) => None,
        None if now - scheduled <= Duration::minutes(NO_HISTORY_GRACE_MINUTES) => Some(scheduled),
        None => None,
    }
}

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub fn expand_template(template: &str, heartbeat: &Heartbeat, scheduled_at: DateTime<Utc>) -> String {
    template
        .replace("{date}", &scheduled_at.format("%Y-%m-%d").to_string())
        .replace("{datetime}", &scheduled_at.to_rfc3339())
        .replace("{time}", &scheduled_at.format("%H:%M:%S").to_string())
        .replace(
            "{weekday}",
            WEEKDAYS[scheduled_at.weekday().num_days_from_monday() as usize],
        )
        .replace("{heartbeat_name}", &heartbeat.name)
}

pub struct HeartbeatScheduler<'a> {
    store: &'a HeartbeatStore,
    http: reqwest::Client,
}

impl<'a> HeartbeatScheduler<'a> {
    pub fn new(store: &'a HeartbeatStore) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
        }
    }

    /// Computes which heartbeats are due at `now`, pairing each with its
    /// expanded query and scheduled fire time. Does not execute the task
    /// itself; the caller threads the expanded query through the
    /// conductor and reports back via `finish_run`.
    pub fn due_heartbeats(&self, now: DateTime<Utc>) -> Vec<(Heartbeat, String, DateTime<Utc>)> {
        self.store
            .heartbeats
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|heartbeat| {
                let scheduled = is_due(&heartbeat, now)?;
                if !self.store.try_lock(heartbeat.id) {
                    return None;
                }
                let query = expand_template(&heartbeat.query_template, &heartbeat, scheduled);
                Some((heartbeat, query, scheduled))
            })
            .collect()
    }

    /// Records the run outcome, releases the exclusivity lock, and, on
    /// success, POSTs to the heartbeat's webhook if configured. Webhook
    /// failures are logged by the caller via the returned bool; they never
    /// fail the run itself.
    pub async fn finish_run(&self, heartbeat: &Heartbeat, run: &HeartbeatRun) -> bool {
        self.store.release(heartbeat.id);

        if run.status == HeartbeatRunStatus::Completed {
            self.store.record_success(heartbeat.id, Utc::now());
        }

        let Some(webhook_url) = &heartbeat.webhook_url else {
            return true;
        };

        let payload = serde_json::json!({
            "heartbeat_id": heartbeat.id,
            "heartbeat_name": heartbeat.name,
            "run_id": run.id,
            "status": run.status,
            "task_id": run.task_id,
        });

        self.http
            .post(webhook_url)
            .timeout(StdDuration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .json(&payload)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn heartbeat(cron_expression: &str, last_successful_run_at: Option<DateTime<Utc>>) -> Heartbeat {
        Heartbeat {
            id: Uuid::new_v4(),
            app_id: "app1".to_string(),
            user_id: None,
            name: "daily digest".to_string(),
            query_template: "Summarize today ({weekday}, {date})".to_string(),
            cron_expression: cron_expression.to_string(),
            timezone: "UTC".to_string(),
            is_active: true,
            context_template: HashMap::new(),
            webhook_url: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            last_successful_run_at,
        }
    }

    #[test]
    fn due_heartbeat_reports_scheduled_time() {
        // every minute
        let hb = heartbeat("0 * * * * *", Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let scheduled = is_due(&hb, now);
        assert!(scheduled.is_some());
    }

    #[test]
    fn inactive_heartbeat_never_due() {
        let mut hb = heartbeat("0 * * * * *", None);
        hb.is_active = false;
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        assert!(is_due(&hb, now).is_none());
    }

    #[test]
    fn template_expansion_substitutes_all_placeholders() {
        let hb = heartbeat("0 0 9 * * *", None);
        let scheduled = Utc.with_ymd_and_hms(2026, 7, 28, 9, 0, 0).unwrap();
        let expanded = expand_template(&hb.query_template, &hb, scheduled);
        assert!(expanded.contains("Tuesday"));
        assert!(expanded.contains("2026-07-28"));
    }

    #[test]
    fn create_rejects_invalid_cron_expression() {
        let store = HeartbeatStore::new();
        let result = store.create(
            "app1".to_string(),
            None,
            HeartbeatCreate {
                name: "bad".to_string(),
                query_template: "x".to_string(),
                cron_expression: "not a cron".to_string(),
                timezone: "UTC".to_string(),
                context_template: HashMap::new(),
                webhook_url: None,
            },
        );
        assert!(result.is_err());
    }
}
