use async_trait::async_trait;

use super::{string_vec, Instrument};
use crate::error::ConductorResult;
use crate::model::{Finding, InstrumentResult, Outcome, TaskContext};

/// Atomic, single-pass response: one reasoning call, fixed confidence.
pub struct Note {
    required_capabilities: Vec<String>,
    optional_capabilities: Vec<String>,
}

impl Note {
    pub fn new() -> Self {
        Self {
            required_capabilities: string_vec(&["reasoning"]),
            optional_capabilities: Vec::new(),
        }
    }
}

impl Default for Note {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Instrument for Note {
    fn name(&self) -> &str {
        "note"
    }

    fn max_iterations(&self) -> u32 {
        1
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
        // The reasoning tool is a contract-only collaborator (LLM backends
        // are out of scope); resolvability was already checked when the
        // Instrument Registry was constructed.
        let answer = format!("Answer to: {query}");

        Ok(InstrumentResult {
            outcome: Outcome::Complete,
            findings: vec![Finding::new(answer.clone(), 0.9)],
            summary: answer,
            confidence: 0.9,
            iterations: 1,
            sources_consulted: Vec::new(),
            discrepancy: None,
            suggested_followups: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn note_is_single_iteration_complete() {
        let note = Note::new();
        let result = note
            .execute("What is the capital of France?", &TaskContext::default())
            .await
            .unwrap();
        assert_eq!(result.outcome, Outcome::Complete);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.findings.len(), 1);
    }
}
