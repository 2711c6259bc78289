//! Entry point tying every other component together: privacy
//! classification, routing, room selection, the policy/trust gate,
//! dispatch, and post-task bookkeeping.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::approval::ApprovalRouter;
use crate::composition::ArrangementRegistry;
use crate::error::{ConductorError, ConductorResult};
use crate::errors_tracker::ErrorTracker;
use crate::events::{EventBus, NotificationCenter};
use crate::instruments::{self, InstrumentRegistry};
use crate::intervention::InterventionEngine;
use crate::model::{
    ErrorCategory, ErrorSeverity, ExecutionMetadata, Outcome, PolicyAction, ProcessType, TaskContext,
    TaskEvent, TaskPlan, TaskRequest, TaskResponse, TaskStatus, TaskSubmitResponse, Thoroughness,
};
use crate::policy::PolicyEngine;
use crate::privacy::PrivacyClassifier;
use crate::rooms::{RoomClient, RoomRegistry};
use crate::tools::ToolRegistry;
use crate::trust::TrustTracker;

/// Either a plan awaiting approval, or a completed response: the two
/// shapes `POST /tasks` can hand back synchronously.
pub enum ConductorOutcome {
    Plan(TaskSubmitResponse),
    Response(TaskResponse),
}

/// All shared state a Conductor needs; cheap to clone (every field is an
/// `Arc`) so a server layer can move a handle into a spawned task per
/// request.
#[derive(Clone)]
pub struct Conductor {
    instruments: Arc<InstrumentRegistry>,
    rooms: Arc<RoomRegistry>,
    room_client: Arc<RoomClient>,
    privacy: Arc<PrivacyClassifier>,
    policy: Arc<PolicyEngine>,
    trust: Arc<TrustTracker>,
    approvals: Arc<ApprovalRouter>,
    errors: Arc<ErrorTracker>,
    events: Arc<EventBus>,
    arrangements: Arc<ArrangementRegistry>,
    notifications: Arc<NotificationCenter>,
}

impl Conductor {
    pub fn new(tools: &ToolRegistry) -> ConductorResult<Self> {
        Ok(Self {
            instruments: Arc::new(InstrumentRegistry::build(tools)?),
            rooms: Arc::new(RoomRegistry::new()),
            room_client: Arc::new(RoomClient::new()),
            privacy: Arc::new(PrivacyClassifier::default()),
            policy: Arc::new(PolicyEngine::default()),
            trust: Arc::new(TrustTracker::new()),
            approvals: Arc::new(ApprovalRouter::new()),
            errors: Arc::new(ErrorTracker::new()),
            events: Arc::new(EventBus::new()),
            arrangements: Arc::new(ArrangementRegistry::new()),
            notifications: Arc::new(NotificationCenter::new()),
        })
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn approvals(&self) -> &ApprovalRouter {
        &self.approvals
    }

    pub fn trust(&self) -> &TrustTracker {
        &self.trust
    }

    pub fn errors(&self) -> &ErrorTracker {
        &self.errors
    }

    pub fn arrangements(&self) -> &ArrangementRegistry {
        &self.arrangements
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn instrument_names(&self) -> Vec<String> {
        self.instruments.names()
    }

    /// Steps 1-4 of the pipeline, followed by full execution when the
    /// policy gate clears. Returns a `Plan` instead when the gate requires
    /// approval at trust level 0.
    pub async fn execute_task(
        &self,
        request: &TaskRequest,
        app_id: &str,
        user_id: Option<&str>,
    ) -> ConductorResult<ConductorOutcome> {
        let context = request.context.clone().unwrap_or_default();
        let preferences = request.preferences.clone().unwrap_or_default();

        let instrument_name = route(&request.query, &context, &preferences);
        let instrument = self
            .instruments
            .get(instrument_name)
            .ok_or_else(|| ConductorError::UnknownInstrument(instrument_name.to_string()))?;

        let privacy = self.privacy.classify(&request.query);

        let trust_level = self.trust.get(app_id, user_id).current_trust_level;
        let action_type = action_type_for(instrument_name);
        let policy_eval = self.policy.evaluate(action_type, trust_level);

        if policy_eval.action == PolicyAction::Deny {
            return Err(ConductorError::PolicyDenied {
                action_type: action_type.to_string(),
                reason: policy_eval.reason,
            });
        }

        let task_id = request.id;

        if policy_eval.action == PolicyAction::RequireApproval && trust_level == 0 {
            self.approvals.submit(
                task_id.to_string(),
                action_type,
                format!("approve running '{instrument_name}' for: {}", request.query),
                serde_json::json!({ "query": request.query, "instrument": instrument_name }),
                trust_level,
                3600,
                Utc::now(),
            );

            let plan = TaskPlan {
                task_id,
                query: request.query.clone(),
                instrument: instrument_name.to_string(),
                process_type: process_type_for(instrument_name),
                estimated_iterations: instrument.max_iterations(),
                description: format!("Run '{instrument_name}' for: {}", request.query),
                requires_approval: true,
            };

            return Ok(ConductorOutcome::Plan(TaskSubmitResponse {
                task_id,
                status: TaskStatus::Pending,
                message: "awaiting approval".to_string(),
                plan: Some(plan),
            }));
        }

        self.events.emit(TaskEvent::Started {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
        });

        let room = self.select_room(instrument.required_capabilities(), privacy.should_stay_local);

        let response = self
            .dispatch(&request.query, &context, task_id, instrument_name, room)
            .await;

        match response {
            Ok(response) => {
                self.trust.record_outcome(app_id, user_id, response.outcome);
                let response = self.enrich_with_interventions(response, &request.query, trust_level);
                self.events.emit(TaskEvent::Complete {
                    task_id: task_id.to_string(),
                    timestamp: Utc::now(),
                    response: response.clone(),
                });
                if preferences.notify_on_complete {
                    self.notifications.raise(
                        app_id,
                        user_id.map(str::to_string),
                        "Task complete",
                        response.summary.clone(),
                    );
                }
                Ok(ConductorOutcome::Response(response))
            }
            Err(err) => {
                self.errors.record(
                    ErrorCategory::InstrumentFailure,
                    ErrorSeverity::Medium,
                    err.to_string(),
                    Some(instrument_name.to_string()),
                    None,
                    Some(task_id.to_string()),
                    Some(request.query.clone()),
                );
                self.trust.record_outcome(app_id, user_id, Outcome::Inconclusive);
                self.events.emit(TaskEvent::Error {
                    task_id: task_id.to_string(),
                    timestamp: Utc::now(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Resolves a saved arrangement by name and runs its composition
    /// directly, skipping routing (the caller already picked a pipeline
    /// by name rather than leaving it to query-based routing). Still
    /// gated by the same policy/trust check as an ad hoc task.
    pub async fn run_arrangement(
        &self,
        name: &str,
        query: &str,
        context: &TaskContext,
        app_id: &str,
        user_id: Option<&str>,
    ) -> ConductorResult<TaskResponse> {
        let arrangement = self
            .arrangements
            .resolve(name)
            .ok_or_else(|| ConductorError::InvalidInput(format!("unknown arrangement: {name}")))?;

        let trust_level = self.trust.get(app_id, user_id).current_trust_level;
        let policy_eval = self.policy.evaluate("task_execution", trust_level);
        if policy_eval.action == PolicyAction::Deny {
            return Err(ConductorError::PolicyDenied {
                action_type: "task_execution".to_string(),
                reason: policy_eval.reason,
            });
        }

        let task_id = Uuid::new_v4();
        let engine = crate::composition::CompositionEngine::new(&self.instruments);
        let result = engine.run(&arrangement.composition, query, context).await?;

        let response = TaskResponse {
            request_id: task_id,
            outcome: result.outcome,
            findings: result.findings,
            summary: result.summary,
            confidence: result.confidence,
            metadata: ExecutionMetadata {
                instrument_used: format!("arrangement:{name}"),
                iterations: result.iterations,
                duration_ms: 0,
                sources_consulted: result.sources_consulted,
                process_type: ProcessType::SemiAutonomic,
                room_id: None,
            },
            discrepancy: None,
            suggested_followups: Vec::new(),
        };
        self.trust.record_outcome(app_id, user_id, response.outcome);
        Ok(response)
    }

    /// Picks the best genuinely remote room (`room_id != "server"`) for
    /// the required capability set, respecting the local-only privacy
    /// constraint. Returns `None` to mean "execute locally".
    fn select_room(&self, required_capabilities: &[String], must_stay_local: bool) -> Option<crate::model::RoomInfo> {
        self.rooms
            .get_best_room_for_task(required_capabilities, None, true, must_stay_local)
            .filter(|room| room.room_id != "server")
    }

    async fn dispatch(
        &self,
        query: &str,
        context: &TaskContext,
        task_id: Uuid,
        instrument_name: &str,
        room: Option<crate::model::RoomInfo>,
    ) -> ConductorResult<TaskResponse> {
        let started = Instant::now();

        if let Some(room) = room {
            let delegation = self.room_client.delegate(&room, instrument_name, query, Some(context)).await;
            if delegation.success {
                return Ok(TaskResponse {
                    request_id: task_id,
                    outcome: delegation.outcome.unwrap_or(Outcome::Inconclusive),
                    findings: delegation.findings,
                    summary: delegation.summary.unwrap_or_default(),
                    confidence: delegation.confidence.unwrap_or(0.0),
                    metadata: delegation.metadata.unwrap_or(ExecutionMetadata {
                        instrument_used: format!("room:{}/{}", room.room_id, instrument_name),
                        iterations: 1,
                        duration_ms: started.elapsed().as_millis() as u64,
                        sources_consulted: Vec::new(),
                        process_type: ProcessType::SemiAutonomic,
                        room_id: Some(room.room_id.clone()),
                    }),
                    discrepancy: None,
                    suggested_followups: Vec::new(),
                });
            }
            tracing::warn!(
                room_id = %room.room_id,
                error = delegation.error.as_deref().unwrap_or("unknown"),
                "room delegation failed, falling back to local execution"
            );
        }

        let instrument = self
            .instruments
            .get(instrument_name)
            .ok_or_else(|| ConductorError::UnknownInstrument(instrument_name.to_string()))?;

        let result = instrument.execute(query, context).await?;

        Ok(TaskResponse {
            request_id: task_id,
            outcome: result.outcome,
            findings: result.findings,
            summary: result.summary,
            confidence: result.confidence,
            metadata: ExecutionMetadata {
                instrument_used: instrument_name.to_string(),
                iterations: result.iterations,
                duration_ms: started.elapsed().as_millis() as u64,
                sources_consulted: result.sources_consulted,
                process_type: process_type_for(instrument_name),
                room_id: None,
            },
            discrepancy: result.discrepancy,
            suggested_followups: result.suggested_followups,
        })
    }

    fn enrich_with_interventions(&self, mut response: TaskResponse, query: &str, trust_level: u8) -> TaskResponse {
        let ctx = InterventionEngine::build_context(
            query,
            response.summary.clone(),
            response.outcome,
            response.confidence,
            response.metadata.instrument_used.clone(),
            trust_level,
            self.errors.get_patterns(),
            Vec::new(),
            self.instruments.names(),
        );
        let result = InterventionEngine::evaluate(&ctx);
        response
            .suggested_followups
            .extend(InterventionEngine::enrich_response(&result));
        response
    }
}

fn action_type_for(instrument_name: &str) -> &'static str {
    match instrument_name {
        "research" => "research",
        _ => "task_execution",
    }
}

fn process_type_for(instrument_name: &str) -> ProcessType {
    match instrument_name {
        "note" => ProcessType::Autonomic,
        _ => ProcessType::SemiAutonomic,
    }
}

/// Routing heuristic (step 2): an image attachment always wins; failing
/// that, a handful of complexity signals route to Research; everything
/// else gets the single-shot Note instrument. Composition and Loop
/// execution are reached through their own endpoints, not this heuristic.
fn route(query: &str, context: &TaskContext, preferences: &crate::model::TaskPreferences) -> &'static str {
    if context.attachments.iter().any(|a| instruments::looks_like_image(a)) {
        return "vision";
    }

    if preferences.thoroughness == Thoroughness::Thorough {
        return "research";
    }

    let lower = query.to_lowercase();
    let word_count = query.split_whitespace().count();
    let question_marks = query.matches('?').count();

    const RESEARCH_KEYWORDS: &[&str] = &[
        "research", "investigate", "compare", "difference between", " vs ", " versus ", "analyze",
    ];
    let matches_keyword = RESEARCH_KEYWORDS.iter().any(|kw| lower.contains(kw));

    if matches_keyword || word_count > 20 || question_marks >= 2 {
        "research"
    } else {
        "note"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskRequest;

    fn conductor() -> Conductor {
        let tools = crate::tools::default_registry();
        Conductor::new(&tools).unwrap()
    }

    #[tokio::test]
    async fn simple_query_routes_to_note_and_completes() {
        let c = conductor();
        c.trust.update_trust_level("app1", None, 3);
        let request = TaskRequest {
            id: Uuid::new_v4(),
            query: "What is the capital of France?".to_string(),
            context: None,
            preferences: None,
        };
        let outcome = c.execute_task(&request, "app1", None).await.unwrap();
        match outcome {
            ConductorOutcome::Response(response) => {
                assert_eq!(response.metadata.instrument_used, "note");
                assert_eq!(response.outcome, Outcome::Complete);
            }
            ConductorOutcome::Plan(_) => panic!("expected an immediate response at trust level 3"),
        }
    }

    #[tokio::test]
    async fn zero_trust_unmatched_action_returns_plan() {
        let c = conductor();
        let request = TaskRequest {
            id: Uuid::new_v4(),
            query: "What is the capital of France?".to_string(),
            context: None,
            preferences: None,
        };
        let outcome = c.execute_task(&request, "app1", None).await.unwrap();
        assert!(matches!(outcome, ConductorOutcome::Plan(_)));
    }

    #[tokio::test]
    async fn run_arrangement_resolves_by_name_and_executes() {
        use crate::composition::{Composition, CompositionStep};
        use crate::model::SavedArrangement;

        let c = conductor();
        c.trust.update_trust_level("app1", None, 3);
        c.arrangements.register(SavedArrangement {
            name: "daily-digest".to_string(),
            description: "Summarize the day".to_string(),
            composition: Composition::Sequential {
                steps: vec![CompositionStep {
                    instrument: "note".to_string(),
                    config: None,
                }],
            },
        });

        let response = c
            .run_arrangement("daily-digest", "take a note", &TaskContext::default(), "app1", None)
            .await
            .unwrap();
        assert_eq!(response.metadata.instrument_used, "arrangement:daily-digest");
        assert_eq!(response.outcome, Outcome::Complete);
    }

    #[tokio::test]
    async fn run_arrangement_unknown_name_errors() {
        let c = conductor();
        let err = c
            .run_arrangement("nope", "q", &TaskContext::default(), "app1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn long_comparison_query_routes_to_research() {
        let c = conductor();
        c.trust.update_trust_level("app1", None, 3);
        let request = TaskRequest {
            id: Uuid::new_v4(),
            query: "Please compare the economic policy of country A vs country B".to_string(),
            context: None,
            preferences: None,
        };
        let outcome = c.execute_task(&request, "app1", None).await.unwrap();
        match outcome {
            ConductorOutcome::Response(response) => {
                assert_eq!(response.metadata.instrument_used, "research");
            }
            ConductorOutcome::Plan(_) => panic!("expected an immediate response at trust level 3"),
        }
    }
}
