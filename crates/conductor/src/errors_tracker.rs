//! Records typed errors, aggregates identical `(category, instrument?,
//! tool?)` combinations into patterns, and feeds the Intervention Engine.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::model::{ErrorCategory, ErrorPattern, ErrorRecord, ErrorSeverity, ErrorStats};

pub struct ErrorTracker {
    records: Mutex<Vec<ErrorRecord>>,
    patterns: Mutex<Vec<ErrorPattern>>,
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            patterns: Mutex::new(Vec::new()),
        }
    }

    pub fn record(
        &self,
        category: ErrorCategory,
        severity: ErrorSeverity,
        error_message: impl Into<String>,
        instrument: Option<String>,
        tool: Option<String>,
        task_id: Option<String>,
        query: Option<String>,
    ) -> ErrorRecord {
        let record = ErrorRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category,
            severity,
            task_id,
            query,
            instrument: instrument.clone(),
            tool: tool.clone(),
            error_message: error_message.into(),
            was_recovered: false,
        };
        self.records.lock().unwrap().push(record.clone());
        self.aggregate(category, instrument, tool, record.timestamp);
        record
    }

    fn aggregate(
        &self,
        category: ErrorCategory,
        instrument: Option<String>,
        tool: Option<String>,
        at: DateTime<Utc>,
    ) {
        let mut patterns = self.patterns.lock().unwrap();
        if let Some(existing) = patterns.iter_mut().find(|p| {
            p.category == category && p.instrument == instrument && p.tool == tool
        }) {
            existing.occurrence_count += 1;
            existing.last_seen = at;
        } else {
            patterns.push(ErrorPattern {
                id: Uuid::new_v4(),
                name: format!("{category:?}:{instrument:?}:{tool:?}"),
                description: format!("recurring {category:?} error"),
                category,
                instrument,
                tool,
                occurrence_count: 1,
                first_seen: at,
                last_seen: at,
                suggested_action: None,
                confidence: 0.5,
            });
        }
    }

    pub fn get_patterns(&self) -> Vec<ErrorPattern> {
        self.patterns.lock().unwrap().clone()
    }

    pub fn stats(&self) -> ErrorStats {
        let records = self.records.lock().unwrap();
        let now = Utc::now();
        let mut stats = ErrorStats::default();
        stats.total_errors = records.len() as u64;

        let mut recovered = 0u64;
        for record in records.iter() {
            *stats
                .errors_by_category
                .entry(format!("{:?}", record.category))
                .or_insert(0) += 1;
            *stats
                .errors_by_severity
                .entry(format!("{:?}", record.severity))
                .or_insert(0) += 1;
            if let Some(instrument) = &record.instrument {
                *stats.errors_by_instrument.entry(instrument.clone()).or_insert(0) += 1;
            }
            if record.was_recovered {
                recovered += 1;
            }
            if now - record.timestamp <= Duration::hours(1) {
                stats.errors_last_hour += 1;
            }
            if now - record.timestamp <= Duration::hours(24) {
                stats.errors_last_24h += 1;
            }
        }

        stats.recovery_rate = if records.is_empty() {
            0.0
        } else {
            recovered as f64 / records.len() as f64
        };
        stats.patterns_detected = self.patterns.lock().unwrap().len() as u64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_errors_aggregate_into_one_pattern() {
        let tracker = ErrorTracker::new();
        for _ in 0..3 {
            tracker.record(
                ErrorCategory::Timeout,
                ErrorSeverity::Medium,
                "timed out",
                Some("research".to_string()),
                Some("tavily".to_string()),
                None,
                None,
            );
        }
        let patterns = tracker.get_patterns();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].occurrence_count, 3);
    }

    #[test]
    fn different_instruments_produce_different_patterns() {
        let tracker = ErrorTracker::new();
        tracker.record(
            ErrorCategory::Timeout,
            ErrorSeverity::Medium,
            "timed out",
            Some("research".to_string()),
            None,
            None,
            None,
        );
        tracker.record(
            ErrorCategory::Timeout,
            ErrorSeverity::Medium,
            "timed out",
            Some("vision".to_string()),
            None,
            None,
            None,
        );
        assert_eq!(tracker.get_patterns().len(), 2);
    }
}
