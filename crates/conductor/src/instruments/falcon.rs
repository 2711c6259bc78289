use async_trait::async_trait;

use super::{string_vec, Instrument};
use crate::error::ConductorResult;
use crate::model::{Finding, InstrumentResult, Outcome, TaskContext};

/// Room-delegating stub. Declares a capability (`shell_execution`) that is
/// only ever satisfied by a remote room; the Conductor's room-scoring step
/// delegates before this ever runs. If it *does* run, it means no room was
/// available, so it reports a bounded, explanatory result rather than
/// pretending to execute shell commands locally.
pub struct Falcon {
    required_capabilities: Vec<String>,
    optional_capabilities: Vec<String>,
}

impl Falcon {
    pub fn new() -> Self {
        Self {
            required_capabilities: string_vec(&["shell_execution"]),
            optional_capabilities: Vec::new(),
        }
    }
}

impl Default for Falcon {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Instrument for Falcon {
    fn name(&self) -> &str {
        "falcon"
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
        Ok(InstrumentResult {
            outcome: Outcome::Bounded,
            findings: vec![Finding::new(
                format!("'{query}' requires shell execution but no room was available"),
                0.3,
            )],
            summary: "no delegating room available for shell execution".to_string(),
            confidence: 0.3,
            iterations: 1,
            sources_consulted: Vec::new(),
            discrepancy: None,
            suggested_followups: vec!["Register a room advertising shell_execution".to_string()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_when_run_without_a_room() {
        let falcon = Falcon::new();
        let result = falcon
            .execute("run this script", &TaskContext::default())
            .await
            .unwrap();
        assert_eq!(result.outcome, Outcome::Bounded);
    }
}
