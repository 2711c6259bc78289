//! Tracks task outcomes per `(app_id, user_id?)` and suggests autonomy
//! upgrades. `user_id = None` is a distinct "app-wide" key, not a fallback
//! for per-user metrics; the two are never merged.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::model::{Outcome, TrustMetrics};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TrustKey {
    app_id: String,
    user_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct TrustUpgradeSuggestion {
    pub from_level: u8,
    pub to_level: u8,
}

pub struct TrustTracker {
    metrics: Mutex<HashMap<TrustKey, TrustMetrics>>,
}

impl Default for TrustTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustTracker {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, app_id: &str, user_id: Option<&str>) -> TrustMetrics {
        let key = TrustKey {
            app_id: app_id.to_string(),
            user_id: user_id.map(|s| s.to_string()),
        };
        self.metrics
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| TrustMetrics {
                app_id: app_id.to_string(),
                user_id: user_id.map(|s| s.to_string()),
                ..Default::default()
            })
    }

    /// `consecutive_successes` increments only when the outcome is
    /// COMPLETE or SATURATED, else resets to 0. Other counters are
    /// monotonic. `current_trust_level` is never touched here; only an
    /// explicit `update_trust_level` may change it.
    pub fn record_outcome(&self, app_id: &str, user_id: Option<&str>, outcome: Outcome) -> TrustMetrics {
        let key = TrustKey {
            app_id: app_id.to_string(),
            user_id: user_id.map(|s| s.to_string()),
        };
        let mut metrics = self.metrics.lock().unwrap();
        let entry = metrics.entry(key).or_insert_with(|| TrustMetrics {
            app_id: app_id.to_string(),
            user_id: user_id.map(|s| s.to_string()),
            ..Default::default()
        });

        entry.total_tasks += 1;
        let succeeded = matches!(outcome, Outcome::Complete | Outcome::Saturated);
        if succeeded {
            entry.successful_tasks += 1;
            entry.consecutive_successes += 1;
        } else {
            entry.failed_tasks += 1;
            entry.consecutive_successes = 0;
        }
        let now = Utc::now();
        entry.last_task_at = Some(now);
        entry.updated_at = Some(now);
        entry.clone()
    }

    /// Explicit, possibly demoting, trust level update.
    pub fn update_trust_level(&self, app_id: &str, user_id: Option<&str>, new_level: u8) -> TrustMetrics {
        let key = TrustKey {
            app_id: app_id.to_string(),
            user_id: user_id.map(|s| s.to_string()),
        };
        let mut metrics = self.metrics.lock().unwrap();
        let entry = metrics.entry(key).or_insert_with(|| TrustMetrics {
            app_id: app_id.to_string(),
            user_id: user_id.map(|s| s.to_string()),
            ..Default::default()
        });
        entry.current_trust_level = new_level;
        entry.updated_at = Some(Utc::now());
        entry.clone()
    }

    /// Suggests an upgrade per the consecutive_successes/success_rate
    /// table: 0->1 at (5, 0.80), 1->2 at (10, 0.90), 2->3 at (20, 0.95).
    /// Never suggests a level the metrics already meet or exceed.
    pub fn suggest_upgrade(&self, metrics: &TrustMetrics) -> Option<TrustUpgradeSuggestion> {
        let success_rate = if metrics.total_tasks == 0 {
            0.0
        } else {
            metrics.successful_tasks as f64 / metrics.total_tasks as f64
        };

        let thresholds: [(u8, u8, u64, f64); 3] = [
            (0, 1, 5, 0.80),
            (1, 2, 10, 0.90),
            (2, 3, 20, 0.95),
        ];

        thresholds
            .into_iter()
            .find(|(from, _, min_streak, min_rate)| {
                metrics.current_trust_level == *from
                    && metrics.consecutive_successes >= *min_streak
                    && success_rate >= *min_rate
            })
            .map(|(from, to, _, _)| TrustUpgradeSuggestion {
                from_level: from,
                to_level: to,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_successes_resets_on_failure() {
        let tracker = TrustTracker::new();
        tracker.record_outcome("app1", None, Outcome::Complete);
        tracker.record_outcome("app1", None, Outcome::Complete);
        let metrics = tracker.record_outcome("app1", None, Outcome::Inconclusive);
        assert_eq!(metrics.consecutive_successes, 0);
        assert_eq!(metrics.total_tasks, 3);
    }

    #[test]
    fn app_wide_and_per_user_keys_are_distinct() {
        let tracker = TrustTracker::new();
        tracker.record_outcome("app1", None, Outcome::Complete);
        tracker.record_outcome("app1", Some("u1"), Outcome::Complete);
        assert_eq!(tracker.get("app1", None).total_tasks, 1);
        assert_eq!(tracker.get("app1", Some("u1")).total_tasks, 1);
    }

    #[test]
    fn suggests_upgrade_once_thresholds_clear() {
        let tracker = TrustTracker::new();
        for _ in 0..5 {
            tracker.record_outcome("app1", None, Outcome::Complete);
        }
        let metrics = tracker.get("app1", None);
        let suggestion = tracker.suggest_upgrade(&metrics).unwrap();
        assert_eq!(suggestion.from_level, 0);
        assert_eq!(suggestion.to_level, 1);
    }

    #[test]
    fn explicit_update_can_demote() {
        let tracker = TrustTracker::new();
        tracker.update_trust_level("app1", None, 3);
        let metrics = tracker.update_trust_level("app1", None, 1);
        assert_eq!(metrics.current_trust_level, 1);
    }
}
