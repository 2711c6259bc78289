//! Post-task enrichment: proactive suggestions, pushback, scoping, and
//! education, trust-gated and fail-open (a detector error never blocks
//! task completion).

use serde::{Deserialize, Serialize};

use crate::model::{ErrorPattern, Outcome};

const MAX_INTERVENTIONS: usize = 3;
const MAX_RECENT_QUERIES: usize = 20;
const PUSHBACK_WORD_LIMIT: usize = 80;
const SCOPING_CONJUNCTION_MIN: usize = 3;
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;
const PROACTIVE_OCCURRENCE_THRESHOLD: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    Proactive,
    Pushback,
    Scoping,
    Education,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intervention {
    #[serde(rename = "type")]
    pub kind: InterventionType,
    pub message: String,
    pub confidence: f64,
    pub source: String,
}

#[derive(Debug, Clone, Default)]
pub struct InterventionContext {
    pub query: String,
    pub response_summary: String,
    pub response_outcome: Outcome,
    pub response_confidence: f64,
    pub instrument_used: String,
    pub intent_type: Option<String>,
    pub trust_level: u8,
    pub error_patterns: Vec<ErrorPattern>,
    pub recent_queries: Vec<String>,
    pub available_instruments: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InterventionResult {
    pub interventions: Vec<Intervention>,
}

/// `trust_level` gates which intervention types may surface: 0 sees all
/// four, 1 sees proactive/pushback/scoping, >=2 sees only
/// proactive/pushback.
fn allowed_types(trust_level: u8) -> Vec<InterventionType> {
    use InterventionType::*;
    match trust_level {
        0 => vec![Proactive, Pushback, Scoping, Education],
        1 => vec![Proactive, Pushback, Scoping],
        _ => vec![Proactive, Pushback],
    }
}

fn detect_proactive(ctx: &InterventionContext) -> Option<Intervention> {
    let pattern = ctx
        .error_patterns
        .iter()
        .filter(|p| p.occurrence_count >= PROACTIVE_OCCURRENCE_THRESHOLD)
        .filter(|p| {
            p.instrument
                .as_deref()
                .map(|i| i == ctx.instrument_used)
                .unwrap_or(true)
        })
        .max_by_key(|p| p.occurrence_count)?;

    Some(Intervention {
        kind: InterventionType::Proactive,
        message: format!(
            "This kind of task has hit '{:?}' errors {} times recently; consider {}",
            pattern.category,
            pattern.occurrence_count,
            pattern
                .suggested_action
                .clone()
                .unwrap_or_else(|| "reviewing the underlying tool config".to_string())
        ),
        confidence: (0.5 + 0.1 * pattern.occurrence_count as f64).min(0.95),
        source: format!("error_pattern:{:?}", pattern.category),
    })
}

fn detect_pushback(ctx: &InterventionContext) -> Option<Intervention> {
    let word_count = ctx.query.split_whitespace().count();
    if word_count <= PUSHBACK_WORD_LIMIT {
        return None;
    }
    Some(Intervention {
        kind: InterventionType::Pushback,
        message: format!(
            "This request is quite broad ({word_count} words) — consider narrowing it to a specific question"
        ),
        confidence: 0.6,
        source: "query_length".to_string(),
    })
}

fn conjunction_count(query: &str) -> usize {
    let lower = query.to_lowercase();
    ["and", "also", "plus", "as well as"]
        .iter()
        .map(|word| lower.matches(word).count())
        .sum()
}

fn detect_scoping(ctx: &InterventionContext) -> Option<Intervention> {
    let conjunctions = conjunction_count(&ctx.query);
    let outcome_warrants = matches!(ctx.response_outcome, Outcome::Inconclusive | Outcome::Bounded)
        || ctx.response_confidence < LOW_CONFIDENCE_THRESHOLD;

    if conjunctions < SCOPING_CONJUNCTION_MIN || !outcome_warrants {
        return None;
    }

    Some(Intervention {
        kind: InterventionType::Scoping,
        message: "This request bundles several asks together — splitting it into separate questions may get better results".to_string(),
        confidence: 0.55,
        source: "conjunction_count".to_string(),
    })
}

fn detect_education(ctx: &InterventionContext) -> Option<Intervention> {
    if ctx.instrument_used != "note" {
        return None;
    }
    let better_fit = ctx
        .available_instruments
        .iter()
        .find(|name| name.as_str() == "research")?;
    if ctx.response_confidence >= 0.85 {
        return None;
    }

    Some(Intervention {
        kind: InterventionType::Education,
        message: format!(
            "Try asking for '{better_fit}'-style research next time for deeper, multi-source answers"
        ),
        confidence: 0.4,
        source: "capability_mismatch".to_string(),
    })
}

pub struct InterventionEngine;

impl InterventionEngine {
    pub fn build_context(
        query: impl Into<String>,
        response_summary: impl Into<String>,
        response_outcome: Outcome,
        response_confidence: f64,
        instrument_used: impl Into<String>,
        trust_level: u8,
        error_patterns: Vec<ErrorPattern>,
        recent_queries: Vec<String>,
        available_instruments: Vec<String>,
    ) -> InterventionContext {
        let mut recent_queries = recent_queries;
        if recent_queries.len() > MAX_RECENT_QUERIES {
            let excess = recent_queries.len() - MAX_RECENT_QUERIES;
            recent_queries.drain(0..excess);
        }
        let query = query.into();
        let intent_type = Some(crate::model::IntentType::classify(&query).as_str().to_string());
        InterventionContext {
            query,
            response_summary: response_summary.into(),
            response_outcome,
            response_confidence,
            instrument_used: instrument_used.into(),
            intent_type,
            trust_level,
            error_patterns,
            recent_queries,
            available_instruments,
        }
    }

    /// Runs all four detectors fail-open (a detector returning `None` or
    /// panicking-equivalent condition is simply skipped), filters by the
    /// trust gate, sorts by confidence descending, and truncates to
    /// `MAX_INTERVENTIONS`.
    pub fn evaluate(ctx: &InterventionContext) -> InterventionResult {
        let allowed = allowed_types(ctx.trust_level);

        let mut interventions: Vec<Intervention> = [
            detect_proactive(ctx),
            detect_pushback(ctx),
            detect_scoping(ctx),
            detect_education(ctx),
        ]
        .into_iter()
        .flatten()
        .filter(|i| allowed.contains(&i.kind))
        .collect();

        interventions.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        interventions.truncate(MAX_INTERVENTIONS);

        InterventionResult { interventions }
    }

    /// Prefixes each intervention message with `"[<type>] "` so it reads
    /// naturally when appended to `suggested_followups`.
    pub fn enrich_response(result: &InterventionResult) -> Vec<String> {
        result
            .interventions
            .iter()
            .map(|i| format!("[{:?}] {}", i.kind, i.message))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn pattern(occurrence_count: u64, instrument: Option<&str>) -> ErrorPattern {
        ErrorPattern {
            id: Uuid::new_v4(),
            name: "p".to_string(),
            description: "d".to_string(),
            category: crate::model::ErrorCategory::Timeout,
            instrument: instrument.map(|s| s.to_string()),
            tool: None,
            occurrence_count,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            suggested_action: None,
            confidence: 0.5,
        }
    }

    #[test]
    fn proactive_fires_above_occurrence_threshold() {
        let ctx = InterventionContext {
            query: "hi".to_string(),
            instrument_used: "research".to_string(),
            error_patterns: vec![pattern(3, Some("research"))],
            trust_level: 0,
            ..Default::default()
        };
        let result = InterventionEngine::evaluate(&ctx);
        assert!(result
            .interventions
            .iter()
            .any(|i| i.kind == InterventionType::Proactive));
    }

    #[test]
    fn trust_level_two_only_sees_proactive_and_pushback() {
        let long_query = "word ".repeat(100);
        let ctx = InterventionContext {
            query: long_query,
            trust_level: 2,
            ..Default::default()
        };
        let result = InterventionEngine::evaluate(&ctx);
        assert!(result
            .interventions
            .iter()
            .all(|i| matches!(i.kind, InterventionType::Proactive | InterventionType::Pushback)));
    }

    #[test]
    fn truncates_to_max_interventions() {
        let long_query = format!("{} and also and plus as well as", "word ".repeat(100));
        let ctx = InterventionContext {
            query: long_query,
            instrument_used: "note".to_string(),
            available_instruments: vec!["research".to_string()],
            response_confidence: 0.3,
            response_outcome: Outcome::Inconclusive,
            error_patterns: vec![pattern(5, None)],
            trust_level: 0,
            ..Default::default()
        };
        let result = InterventionEngine::evaluate(&ctx);
        assert!(result.interventions.len() <= MAX_INTERVENTIONS);
    }
}
