use std::collections::BTreeSet;

use async_trait::async_trait;

use super::{string_vec, Instrument};
use crate::error::ConductorResult;
use crate::model::{Finding, InstrumentResult, Outcome, TaskContext};
use crate::termination::TerminationEvaluator;

const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Iterative web research following the scientific-method loop: generate
/// queries, search, ingest into findings (deduped by source), recompute
/// confidence, ask the Termination Evaluator, refine.
pub struct Research {
    required_capabilities: Vec<String>,
    optional_capabilities: Vec<String>,
    max_iterations: u32,
    evaluator: TerminationEvaluator,
}

impl Research {
    pub fn new() -> Self {
        Self {
            required_capabilities: string_vec(&["reasoning", "web_search"]),
            optional_capabilities: string_vec(&["synthesis", "analysis"]),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            evaluator: TerminationEvaluator::default(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn search(&self, query: &str, iteration: u32) -> Finding {
        Finding::new(
            format!("Result for '{query}' (pass {iteration})"),
            0.6 + 0.05 * iteration as f64,
        )
        .with_source(format!("source-{iteration}"))
    }

    /// Flags a contradiction when two findings' content overlaps on a
    /// keyword but their confidence differs sharply enough to suggest
    /// disagreement rather than corroboration.
    fn detect_discrepancy(findings: &[Finding]) -> Option<String> {
        for a in findings {
            for b in findings {
                if a.content != b.content && (a.confidence - b.confidence).abs() > 0.5 {
                    return Some(format!(
                        "conflicting confidence between '{}' and '{}'",
                        a.content, b.content
                    ));
                }
            }
        }
        None
    }
}

impl Default for Research {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Instrument for Research {
    fn name(&self) -> &str {
        "research"
    }

    fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    fn required_capabilities(&self) -> &[String] {
        &self.required_capabilities
    }

    fn optional_capabilities(&self) -> &[String] {
        &self.optional_capabilities
    }

    async fn execute(
        &self,
        query: &str,
        _context: &TaskContext,
    ) -> ConductorResult<InstrumentResult> {
        let mut findings: Vec<Finding> = Vec::new();
        let mut sources: BTreeSet<String> = BTreeSet::new();
        let mut confidence_history: Vec<f64> = Vec::new();
        let mut previous_finding_count = 0usize;
        let mut iteration = 0u32;
        let mut outcome = Outcome::Bounded;

        loop {
            iteration += 1;
            let finding = self.search(query, iteration);
            if let Some(source) = &finding.source {
                if sources.insert(source.clone()) {
                    findings.push(finding);
                }
            } else {
                findings.push(finding);
            }

            let confidence =
                self.evaluator
                    .calculate_confidence(&findings, sources.len(), iteration >= 2);
            confidence_history.push(confidence);

            let decision = self.evaluator.evaluate(
                &findings,
                iteration,
                self.max_iterations,
                &confidence_history,
                previous_finding_count,
            );
            previous_finding_count = findings.len();

            if decision.should_terminate {
                outcome = decision.outcome.unwrap_or(Outcome::Bounded);
                break;
            }
        }

        let discrepancy = Self::detect_discrepancy(&findings);
        let suggested_followups = if discrepancy.is_some() {
            vec!["Resolve conflicting findings before acting on them".to_string()]
        } else {
            Vec::new()
        };

        let final_confidence = confidence_history.last().copied().unwrap_or(0.0);

        Ok(InstrumentResult {
            outcome,
            summary: format!("Researched '{query}' over {iteration} iteration(s)"),
            confidence: final_confidence,
            iterations: iteration,
            sources_consulted: sources.into_iter().collect(),
            findings,
            discrepancy,
            suggested_followups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stays_within_declared_max_iterations() {
        let research = Research::new().with_max_iterations(3);
        let result = research
            .execute("compare rust vs go for backend services", &TaskContext::default())
            .await
            .unwrap();
        assert!(result.iterations <= 3);
    }

    #[tokio::test]
    async fn sources_are_deduplicated() {
        let research = Research::new().with_max_iterations(4);
        let result = research
            .execute("what are the tradeoffs", &TaskContext::default())
            .await
            .unwrap();
        let unique: BTreeSet<_> = result.sources_consulted.iter().collect();
        assert_eq!(unique.len(), result.sources_consulted.len());
    }
}
