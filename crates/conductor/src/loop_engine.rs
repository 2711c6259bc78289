//! Proposes and runs novel multi-phase loops when no registered arrangement
//! fits a query.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{ConductorError, ConductorResult};
use crate::instruments::InstrumentRegistry;
use crate::model::{Finding, InstrumentResult, Outcome, TaskContext};

const SCIENTIFIC_METHOD_PHASES: &[(&str, &[&str])] = &[
    ("hypothesize", &["hypothesize", "hypothesis", "conjecture", "propose", "theorize"]),
    ("gather", &["gather", "collect", "search", "find", "research", "investigate"]),
    ("analyze", &["analyze", "examine", "evaluate", "assess", "compare", "test"]),
    ("synthesize", &["synthesize", "summarize", "conclude", "integrate", "combine"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseAction {
    Instrument,
    Prompt,
    Spawn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopPhase {
    pub name: String,
    pub description: String,
    pub action: PhaseAction,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default = "default_phase_iterations")]
    pub max_iterations: u32,
}

fn default_phase_iterations() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopProposal {
    pub name: String,
    pub description: String,
    pub phases: Vec<LoopPhase>,
    pub termination_criteria: String,
    #[serde(default = "default_max_total_iterations")]
    pub max_total_iterations: u32,
    #[serde(default = "default_capabilities")]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub scientific_method_phases: Vec<String>,
}

fn default_max_total_iterations() -> u32 {
    10
}

fn default_capabilities() -> Vec<String> {
    vec!["reasoning".to_string()]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopProposalValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub scientific_method_coverage: HashMap<String, bool>,
}

pub struct LoopPlanner {
    known_instruments: BTreeSet<String>,
}

impl LoopPlanner {
    pub fn new(known_instruments: impl IntoIterator<Item = String>) -> Self {
        Self {
            known_instruments: known_instruments.into_iter().collect(),
        }
    }

    fn scientific_method_coverage(&self, proposal: &LoopProposal) -> HashMap<String, bool> {
        let mut coverage: HashMap<String, bool> = SCIENTIFIC_METHOD_PHASES
            .iter()
            .map(|(phase, _)| (phase.to_string(), false))
            .collect();

        for phase in &proposal.phases {
            let text = format!("{} {}", phase.name, phase.description).to_lowercase();
            for (method_phase, keywords) in SCIENTIFIC_METHOD_PHASES {
                if keywords.iter().any(|kw| text.contains(kw)) {
                    coverage.insert(method_phase.to_string(), true);
                }
            }
        }
        for declared in &proposal.scientific_method_phases {
            if coverage.contains_key(declared) {
                coverage.insert(declared.clone(), true);
            }
        }
        coverage
    }

    /// Validates phase count, instrument references, scientific-method
    /// coverage, termination criteria, iteration bounds, and capabilities.
    pub fn validate(&self, proposal: &LoopProposal) -> LoopProposalValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if proposal.phases.len() < 2 {
            errors.push("loop must have at least 2 phases".to_string());
        }

        for (i, phase) in proposal.phases.iter().enumerate() {
            match phase.action {
                PhaseAction::Instrument => match &phase.instrument {
                    None => errors.push(format!(
                        "phase {} ({}): instrument action requires instrument field",
                        i + 1,
                        phase.name
                    )),
                    Some(name) if !self.known_instruments.contains(name) => errors.push(format!(
                        "phase {} ({}): unknown instrument '{name}'",
                        i + 1,
                        phase.name
                    )),
                    Some(_) => {}
                },
                PhaseAction::Prompt => {
                    if phase.prompt_template.is_none() {
                        errors.push(format!(
                            "phase {} ({}): prompt action requires prompt_template field",
                            i + 1,
                            phase.name
                        ));
                    }
                }
                PhaseAction::Spawn => {}
            }
        }

        let coverage = self.scientific_method_coverage(proposal);
        let uncovered: Vec<&str> = coverage
            .iter()
            .filter(|(_, covered)| !**covered)
            .map(|(phase, _)| phase.as_str())
            .collect();

        if uncovered.len() >= 3 {
            errors.push(format!(
                "insufficient scientific method coverage, missing: {uncovered:?}"
            ));
        } else if !uncovered.is_empty() {
            warnings.push(format!(
                "partial scientific method coverage, could add: {uncovered:?}"
            ));
        }

        if proposal.termination_criteria.trim().len() < 10 {
            warnings.push("termination criteria should be more specific".to_string());
        }

        if proposal.max_total_iterations > 20 {
            errors.push("max_total_iterations cannot exceed 20".to_string());
        } else if proposal.max_total_iterations > 15 {
            warnings.push("high iteration count may cause long execution times".to_string());
        }

        if !proposal
            .required_capabilities
            .iter()
            .any(|c| c == "reasoning")
        {
            warnings.push("most loops require 'reasoning' capability".to_string());
        }

        LoopProposalValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
            scientific_method_coverage: coverage,
        }
    }
}

pub struct LoopExecutor<'a> {
    instruments: &'a InstrumentRegistry,
}

impl<'a> LoopExecutor<'a> {
    pub fn new(instruments: &'a InstrumentRegistry) -> Self {
        Self { instruments }
    }

    /// Runs phases in order, accumulating findings/sources, threading
    /// previous findings as context into the next phase. Stops early with
    /// `Inconclusive` on any phase returning that outcome; stops with
    /// `Bounded` once the per-phase iteration budget is exhausted.
    /// Otherwise `Complete` if the last confidence clears `confidence_gate`,
    /// else `Saturated`.
    pub async fn execute(
        &self,
        proposal: &LoopProposal,
        query: &str,
        context: &mut TaskContext,
        confidence_gate: f64,
    ) -> ConductorResult<InstrumentResult> {
        if context.depth > context.max_depth {
            return Err(ConductorError::DepthExceeded {
                depth: context.depth,
                max_depth: context.max_depth,
            });
        }

        let mut findings: Vec<Finding> = Vec::new();
        let mut sources: BTreeSet<String> = BTreeSet::new();
        let mut total_iterations = 0u32;
        let mut last_confidence = 0.0f64;

        for phase in &proposal.phases {
            if total_iterations >= proposal.max_total_iterations {
                return Ok(InstrumentResult {
                    outcome: Outcome::Bounded,
                    findings,
                    summary: format!("loop '{}' hit its iteration budget", proposal.name),
                    confidence: last_confidence,
                    iterations: total_iterations,
                    sources_consulted: sources.into_iter().collect(),
                    discrepancy: None,
                    suggested_followups: Vec::new(),
                });
            }

            let phase_result = self.run_phase(phase, query, context).await?;
            total_iterations += phase_result.iterations;
            sources.extend(phase_result.sources_consulted.iter().cloned());
            last_confidence = phase_result.confidence;
            findings.extend(phase_result.findings.clone());

            context.input_results = vec![serde_json::to_value(&phase_result)
                .map_err(|e| ConductorError::Internal(e.to_string()))?];

            if phase_result.outcome == Outcome::Inconclusive {
                return Ok(InstrumentResult {
                    outcome: Outcome::Inconclusive,
                    findings,
                    summary: format!(
                        "loop '{}' stopped at phase '{}': inconclusive",
                        proposal.name, phase.name
                    ),
                    confidence: last_confidence,
                    iterations: total_iterations,
                    sources_consulted: sources.into_iter().collect(),
                    discrepancy: None,
                    suggested_followups: Vec::new(),
                });
            }
        }

        let outcome = if last_confidence >= confidence_gate {
            Outcome::Complete
        } else {
            Outcome::Saturated
        };

        Ok(InstrumentResult {
            outcome,
            findings,
            summary: format!("loop '{}' completed", proposal.name),
            confidence: last_confidence,
            iterations: total_iterations,
            sources_consulted: sources.into_iter().collect(),
            discrepancy: None,
            suggested_followups: Vec::new(),
        })
    }

    async fn run_phase(
        &self,
        phase: &LoopPhase,
        query: &str,
        context: &mut TaskContext,
    ) -> ConductorResult<InstrumentResult> {
        match phase.action {
            PhaseAction::Instrument => {
                let name = phase
                    .instrument
                    .as_ref()
                    .ok_or_else(|| ConductorError::InvalidLoopProposal("missing instrument".into()))?;
                let instrument = self
                    .instruments
                    .get(name)
                    .ok_or_else(|| ConductorError::UnknownInstrument(name.clone()))?;
                instrument.execute(query, context).await
            }
            PhaseAction::Prompt => {
                let template = phase.prompt_template.clone().unwrap_or_default();
                let expanded = expand_prompt_template(&template, query, &phase.name, context);
                Ok(InstrumentResult {
                    outcome: Outcome::Complete,
                    findings: vec![Finding::new(expanded, 0.7)],
                    summary: format!("phase '{}' prompt executed", phase.name),
                    confidence: 0.7,
                    iterations: 1,
                    sources_consulted: Vec::new(),
                    discrepancy: None,
                    suggested_followups: Vec::new(),
                })
            }
            PhaseAction::Spawn => {
                context.depth += 1;
                if context.depth > context.max_depth {
                    return Err(ConductorError::DepthExceeded {
                        depth: context.depth,
                        max_depth: context.max_depth,
                    });
                }
                Ok(InstrumentResult {
                    outcome: Outcome::Complete,
                    findings: vec![Finding::new(
                        format!("spawned sub-task for phase '{}'", phase.name),
                        0.5,
                    )],
                    summary: format!("phase '{}' spawned a sub-task", phase.name),
                    confidence: 0.5,
                    iterations: 1,
                    sources_consulted: Vec::new(),
                    discrepancy: None,
                    suggested_followups: Vec::new(),
                })
            }
        }
    }
}

/// Expands `{query}`, `{previous_findings}`, `{phase_name}` placeholders.
/// Unknown placeholders are left as-is (rejecting them is a validation-time
/// concern, not an execution-time one).
fn expand_prompt_template(
    template: &str,
    query: &str,
    phase_name: &str,
    context: &TaskContext,
) -> String {
    let previous_findings = context
        .input_results
        .first()
        .map(|v| v.to_string())
        .unwrap_or_default();

    template
        .replace("{query}", query)
        .replace("{phase_name}", phase_name)
        .replace("{previous_findings}", &previous_findings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(name: &str, action: PhaseAction) -> LoopPhase {
        LoopPhase {
            name: name.to_string(),
            description: String::new(),
            action,
            instrument: None,
            prompt_template: Some("x".to_string()),
            max_iterations: 1,
        }
    }

    #[test]
    fn rejects_single_phase_proposals() {
        let planner = LoopPlanner::new(["note".to_string()]);
        let proposal = LoopProposal {
            name: "only_one".to_string(),
            description: String::new(),
            phases: vec![phase("gather", PhaseAction::Prompt)],
            termination_criteria: "done when gathered enough evidence".to_string(),
            max_total_iterations: 5,
            required_capabilities: vec!["reasoning".to_string()],
            scientific_method_phases: vec![],
        };
        let validation = planner.validate(&proposal);
        assert!(!validation.valid);
    }

    #[test]
    fn warns_on_high_iteration_count() {
        let planner = LoopPlanner::new(["note".to_string()]);
        let proposal = LoopProposal {
            name: "long_loop".to_string(),
            description: String::new(),
            phases: vec![
                phase("hypothesize", PhaseAction::Prompt),
                phase("gather", PhaseAction::Prompt),
                phase("analyze", PhaseAction::Prompt),
                phase("synthesize", PhaseAction::Prompt),
            ],
            termination_criteria: "done when confidence plateaus".to_string(),
            max_total_iterations: 16,
            required_capabilities: vec!["reasoning".to_string()],
            scientific_method_phases: vec![],
        };
        let validation = planner.validate(&proposal);
        assert!(validation.valid);
        assert!(validation.warnings.iter().any(|w| w.contains("iteration")));
    }

    #[test]
    fn expands_known_placeholders() {
        let context = TaskContext::default();
        let expanded = expand_prompt_template("Q: {query} P: {phase_name}", "hi", "gather", &context);
        assert_eq!(expanded, "Q: hi P: gather");
    }
}
