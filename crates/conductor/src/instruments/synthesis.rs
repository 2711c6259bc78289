use async_trait::async_trait;

use super::{string_vec, Instrument};
use crate::error::ConductorResult;
use crate::model::{Finding, InstrumentResult, Outcome, TaskContext};

/// Merges `context.input_results` into a coherent summary. Order-
/// insensitive by design, so it is safe as the default merge instrument
/// for parallel compositions.
pub struct Synthesis {
    required_capabilities: Vec<String>,
    optional_capabilities: Vec<String>,
}

impl Synthesis {
    pub fn new() -> Self {
        Self {
            required_capabilities: string_vec(&["reasoning", "synthesis"]),
            optional_capabilities: Vec::new(),
        }
    }
}

impl Default for Synthesis {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Instrument for Synthesis {
    fn name(&self) -> &str {
        "synthesis"
    }

    fn max_iterations(&self) -> u32 {
        2
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
        context: &TaskContext,
    ) -> ConductorResult<InstrumentResult> {
        if context.input_results.is_empty() {
            return Ok(InstrumentResult {
                outcome: Outcome::Inconclusive,
                findings: vec![Finding::new("no input_results to synthesize", 0.2)],
                summary: "nothing to synthesize".to_string(),
                confidence: 0.2,
                iterations: 1,
                sources_consulted: Vec::new(),
                discrepancy: None,
                suggested_followups: Vec::new(),
            });
        }

        let findings: Vec<Finding> = context
            .input_results
            .iter()
            .enumerate()
            .map(|(i, value)| Finding::new(format!("input {i}: {value}"), 0.8))
            .collect();

        let summary = format!(
            "Synthesized {} input(s) for '{query}'",
            context.input_results.len()
        );

        Ok(InstrumentResult {
            outcome: Outcome::Complete,
            confidence: 0.85,
            iterations: if context.input_results.len() > 1 { 2 } else { 1 },
            sources_consulted: Vec::new(),
            findings,
            summary,
            discrepancy: None,
            suggested_followups: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inconclusive_without_inputs() {
        let synthesis = Synthesis::new();
        let result = synthesis
            .execute("merge", &TaskContext::default())
            .await
            .unwrap();
        assert_eq!(result.outcome, Outcome::Inconclusive);
    }

    #[tokio::test]
    async fn complete_with_inputs() {
        let synthesis = Synthesis::new();
        let mut context = TaskContext::default();
        context.input_results = vec![serde_json::json!("a"), serde_json::json!("b")];
        let result = synthesis.execute("merge", &context).await.unwrap();
        assert_eq!(result.outcome, Outcome::Complete);
        assert_eq!(result.findings.len(), 2);
    }
}
