//! Sequential pipelines and parallel fan-out/merge over instruments.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::error::{ConductorError, ConductorResult};
use crate::instruments::InstrumentRegistry;
use crate::model::{Finding, InstrumentResult, Outcome, TaskContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionStep {
    pub instrument: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Composition {
    Sequential {
        steps: Vec<CompositionStep>,
    },
    Parallel {
        branches: Vec<String>,
        #[serde(default = "default_merge_instrument")]
        merge_instrument: String,
        #[serde(default)]
        timeout_seconds: Option<f64>,
    },
}

fn default_merge_instrument() -> String {
    "synthesis".to_string()
}

pub struct CompositionEngine<'a> {
    instruments: &'a InstrumentRegistry,
}

impl<'a> CompositionEngine<'a> {
    pub fn new(instruments: &'a InstrumentRegistry) -> Self {
        Self { instruments }
    }

    pub async fn run(
        &self,
        composition: &Composition,
        query: &str,
        context: &TaskContext,
    ) -> ConductorResult<InstrumentResult> {
        match composition {
            Composition::Sequential { steps } => self.run_sequential(steps, query, context).await,
            Composition::Parallel {
                branches,
                merge_instrument,
                timeout_seconds,
            } => {
                self.run_parallel(branches, merge_instrument, *timeout_seconds, query, context)
                    .await
            }
        }
    }

    async fn run_sequential(
        &self,
        steps: &[CompositionStep],
        query: &str,
        context: &TaskContext,
    ) -> ConductorResult<InstrumentResult> {
        let mut sources: BTreeSet<String> = BTreeSet::new();
        let mut total_iterations = 0u32;
        let mut last: Option<InstrumentResult> = None;
        let mut step_context = context.clone();

        for step in steps {
            let instrument = self
                .instruments
                .get(&step.instrument)
                .ok_or_else(|| ConductorError::UnknownInstrument(step.instrument.clone()))?;
            let result = instrument.execute(query, &step_context).await?;
            total_iterations += result.iterations;
            sources.extend(result.sources_consulted.iter().cloned());

            if result.outcome == Outcome::Inconclusive {
                return Ok(InstrumentResult {
                    outcome: Outcome::Inconclusive,
                    iterations: total_iterations,
                    sources_consulted: sources.into_iter().collect(),
                    ..result
                });
            }

            step_context.input_results = vec![serde_json::to_value(&result)
                .map_err(|e| ConductorError::Internal(e.to_string()))?];
            last = Some(result);
        }

        let last = last.ok_or_else(|| ConductorError::InvalidInput("empty composition".into()))?;
        Ok(InstrumentResult {
            iterations: total_iterations,
            sources_consulted: sources.into_iter().collect(),
            ..last
        })
    }

    async fn run_parallel(
        &self,
        branches: &[String],
        merge_instrument: &str,
        timeout_seconds: Option<f64>,
        query: &str,
        context: &TaskContext,
    ) -> ConductorResult<InstrumentResult> {
        let mut branch_findings: Vec<Finding> = Vec::new();
        let mut sources: BTreeSet<String> = BTreeSet::new();
        let mut total_iterations = 0u32;
        let mut any_success = false;

        let mut handles = Vec::new();
        for branch in branches {
            let instrument = self
                .instruments
                .get(branch)
                .ok_or_else(|| ConductorError::UnknownInstrument(branch.clone()))?;
            let query = query.to_string();
            let context = context.clone();
            let branch_name = branch.clone();
            handles.push((
                branch_name,
                tokio::spawn(async move { instrument.execute(&query, &context).await }),
            ));
        }

        for (branch_name, handle) in handles {
            let outcome = match timeout_seconds {
                Some(secs) => {
                    match timeout(Duration::from_secs_f64(secs.max(0.0)), handle).await {
                        Ok(joined) => joined.map_err(|e| ConductorError::Internal(e.to_string())),
                        Err(_) => Ok(Err(ConductorError::Internal(format!(
                            "branch '{branch_name}' timed out"
                        )))),
                    }
                }
                None => handle
                    .await
                    .map_err(|e| ConductorError::Internal(e.to_string())),
            };

            match outcome {
                Ok(Ok(result)) => {
                    total_iterations += result.iterations;
                    sources.extend(result.sources_consulted.iter().cloned());
                    if result.outcome != Outcome::Inconclusive {
                        any_success = true;
                    }
                    branch_findings.extend(result.findings);
                }
                _ => {
                    total_iterations += 1;
                    sources.insert(format!("branch:{branch_name}:timeout"));
                    branch_findings.push(Finding::new(
                        format!("branch '{branch_name}' did not complete in time"),
                        0.0,
                    ));
                }
            }
        }

        if !any_success {
            return Ok(InstrumentResult {
                outcome: Outcome::Inconclusive,
                findings: branch_findings,
                summary: "all parallel branches failed or timed out".to_string(),
                confidence: 0.0,
                iterations: total_iterations,
                sources_consulted: sources.into_iter().collect(),
                discrepancy: None,
                suggested_followups: Vec::new(),
            });
        }

        let merge_instrument = self
            .instruments
            .get(merge_instrument)
            .ok_or_else(|| ConductorError::UnknownInstrument(merge_instrument.to_string()))?;
        let mut merge_context = context.clone();
        merge_context.input_results = branch_findings
            .iter()
            .map(|f| serde_json::json!({"content": f.content, "confidence": f.confidence}))
            .collect();

        let merged = merge_instrument.execute(query, &merge_context).await?;
        total_iterations += merged.iterations;
        sources.extend(merged.sources_consulted.iter().cloned());

        Ok(InstrumentResult {
            iterations: total_iterations,
            sources_consulted: sources.into_iter().collect(),
            ..merged
        })
    }
}

/// Named, reusable `Composition` presets a caller can resolve by name
/// instead of resubmitting the same pipeline payload each time.
pub struct ArrangementRegistry {
    arrangements: std::sync::Mutex<std::collections::HashMap<String, crate::model::SavedArrangement>>,
}

impl Default for ArrangementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrangementRegistry {
    pub fn new() -> Self {
        Self {
            arrangements: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn register(&self, arrangement: crate::model::SavedArrangement) {
        self.arrangements
            .lock()
            .unwrap()
            .insert(arrangement.name.clone(), arrangement);
    }

    pub fn resolve(&self, name: &str) -> Option<crate::model::SavedArrangement> {
        self.arrangements.lock().unwrap().get(name).cloned()
    }

    pub fn list(&self) -> Vec<crate::model::SavedArrangement> {
        self.arrangements.lock().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> InstrumentRegistry {
        let tools = crate::tools::default_registry();
        InstrumentRegistry::build(&tools).unwrap()
    }

    #[tokio::test]
    async fn parallel_with_tight_timeout_is_inconclusive_overall() {
        let instruments = registry();
        let engine = CompositionEngine::new(&instruments);
        let composition = Composition::Parallel {
            branches: vec!["research".to_string(), "research".to_string()],
            merge_instrument: "synthesis".to_string(),
            timeout_seconds: Some(0.0001),
        };
        let result = engine
            .run(&composition, "compare a vs b", &TaskContext::default())
            .await
            .unwrap();
        assert_eq!(result.outcome, Outcome::Inconclusive);
        assert_eq!(result.iterations, 2);
    }

    #[tokio::test]
    async fn sequential_short_circuits_on_inconclusive() {
        let instruments = registry();
        let engine = CompositionEngine::new(&instruments);
        let composition = Composition::Sequential {
            steps: vec![
                CompositionStep {
                    instrument: "synthesis".to_string(),
                    config: None,
                },
                CompositionStep {
                    instrument: "note".to_string(),
                    config: None,
                },
            ],
        };
        // synthesis with empty input_results is inconclusive; should
        // short-circuit before reaching note.
        let result = engine
            .run(&composition, "merge this", &TaskContext::default())
            .await
            .unwrap();
        assert_eq!(result.outcome, Outcome::Inconclusive);
    }

    #[test]
    fn arrangement_registry_round_trips_by_name() {
        let registry = ArrangementRegistry::new();
        assert!(registry.resolve("daily-digest").is_none());

        registry.register(crate::model::SavedArrangement {
            name: "daily-digest".to_string(),
            description: "Summarize the day".to_string(),
            composition: Composition::Sequential {
                steps: vec![CompositionStep {
                    instrument: "synthesis".to_string(),
                    config: None,
                }],
            },
        });

        let resolved = registry.resolve("daily-digest").unwrap();
        assert_eq!(resolved.description, "Summarize the day");
        assert_eq!(registry.list().len(), 1);
    }
}
