//! Core data model shared across the orchestration engine.
//!
//! Storage format is implementation-defined; these types capture the
//! semantic attributes only. Everything here is `Serialize`/`Deserialize`
//! so it can cross the wire (HTTP, room delegation, knowledge sync) or sit
//! behind the `Store` contract unchanged.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal classification of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Complete,
    Saturated,
    Bounded,
    Inconclusive,
}

impl Default for Outcome {
    fn default() -> Self {
        Outcome::Inconclusive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

/// Process visibility classification: how autonomously a task ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessType {
    Autonomic,
    SemiAutonomic,
    Conscious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Thoroughness {
    Quick,
    Balanced,
    Thorough,
}

impl Default for Thoroughness {
    fn default() -> Self {
        Thoroughness::Balanced
    }
}

/// Atomic evidence unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    pub confidence: f64,
}

impl Finding {
    pub fn new(content: impl Into<String>, confidence: f64) -> Self {
        Self {
            content: content.into(),
            source: None,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub conversation_summary: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub input_results: Vec<serde_json::Value>,
    #[serde(default)]
    pub depth: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub intent: Option<String>,
}

fn default_max_depth() -> u32 {
    3
}

impl Default for TaskContext {
    fn default() -> Self {
        Self {
            user_id: None,
            app_id: None,
            conversation_summary: None,
            attachments: Vec::new(),
            location: None,
            input_results: Vec::new(),
            depth: 0,
            max_depth: default_max_depth(),
            intent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPreferences {
    #[serde(default)]
    pub thoroughness: Thoroughness,
    #[serde(default)]
    pub trust_level: u8,
    #[serde(default = "default_true")]
    pub notify_on_complete: bool,
    #[serde(default)]
    pub max_spawn_depth: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Default for TaskPreferences {
    fn default() -> Self {
        Self {
            thoroughness: Thoroughness::default(),
            trust_level: 0,
            notify_on_complete: true,
            max_spawn_depth: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub query: String,
    #[serde(default)]
    pub context: Option<TaskContext>,
    #[serde(default)]
    pub preferences: Option<TaskPreferences>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentResult {
    pub outcome: Outcome,
    pub findings: Vec<Finding>,
    pub summary: String,
    pub confidence: f64,
    pub iterations: u32,
    #[serde(default)]
    pub sources_consulted: Vec<String>,
    #[serde(default)]
    pub discrepancy: Option<String>,
    #[serde(default)]
    pub suggested_followups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub instrument_used: String,
    pub iterations: u32,
    pub duration_ms: u64,
    pub sources_consulted: Vec<String>,
    pub process_type: ProcessType,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub request_id: Uuid,
    pub outcome: Outcome,
    pub findings: Vec<Finding>,
    pub summary: String,
    pub confidence: f64,
    pub metadata: ExecutionMetadata,
    #[serde(default)]
    pub discrepancy: Option<String>,
    #[serde(default)]
    pub suggested_followups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub task_id: Uuid,
    pub query: String,
    pub instrument: String,
    pub process_type: ProcessType,
    pub estimated_iterations: u32,
    pub description: String,
    #[serde(default = "default_true")]
    pub requires_approval: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmitResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub message: String,
    #[serde(default)]
    pub plan: Option<TaskPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPendingResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// Room visibility classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Server,
    Local,
    Ios,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Online,
    Degraded,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_id: String,
    pub room_name: String,
    pub room_type: RoomType,
    pub url: String,
    pub capabilities: Vec<String>,
    pub instruments: Vec<String>,
    pub status: RoomStatus,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRegistration {
    pub room_id: String,
    pub room_name: String,
    pub room_type: RoomType,
    pub url: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub instruments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomHeartbeat {
    pub room_id: String,
    #[serde(default)]
    pub status: Option<RoomStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDelegationResult {
    pub success: bool,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub metadata: Option<ExecutionMetadata>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub id: Uuid,
    pub app_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    pub query_template: String,
    pub cron_expression: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub context_template: HashMap<String, String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_successful_run_at: Option<DateTime<Utc>>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatCreate {
    pub name: String,
    pub query_template: String,
    pub cron_expression: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub context_template: HashMap<String, String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub query_template: Option<String>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub context_template: Option<HashMap<String, String>>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRun {
    pub id: Uuid,
    pub heartbeat_id: Uuid,
    #[serde(default)]
    pub task_id: Option<Uuid>,
    pub status: HeartbeatRunStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub conductor_id: String,
    pub action_type: String,
    pub description: String,
    pub context: serde_json::Value,
    pub trust_level: u8,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustMetrics {
    pub app_id: String,
    pub user_id: Option<String>,
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub consecutive_successes: u64,
    pub current_trust_level: u8,
    pub last_task_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    Allow,
    Deny,
    RequireApproval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    pub description: String,
    pub action_types: Vec<String>,
    pub min_trust_level: u8,
    pub max_trust_level: u8,
    pub action: PolicyAction,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub action: PolicyAction,
    #[serde(default)]
    pub matching_rule: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    Capabilities,
    Boundaries,
    Patterns,
    Changelog,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeSource {
    Seed,
    ErrorTracker,
    ArrangementTracker,
    TrustTracker,
    Manual,
    System,
    Aggregated,
    RoomLearning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: Uuid,
    pub category: KnowledgeCategory,
    pub title: String,
    pub content: String,
    pub source: KnowledgeSource,
    pub confidence: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub version: u64,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFile {
    pub category: KnowledgeCategory,
    pub title: String,
    pub markdown: String,
    pub entries: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserKnowledge {
    pub user_id: String,
    pub trust_level: u8,
    pub total_tasks: u64,
    pub success_rate: f64,
    pub preferred_patterns: Vec<String>,
    pub entries: Vec<KnowledgeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSyncEntry {
    pub id: String,
    pub category: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub confidence: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSyncPush {
    pub server_version: u64,
    #[serde(default)]
    pub entries: Vec<KnowledgeSyncEntry>,
    #[serde(default)]
    pub removed_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomLearning {
    pub category: String,
    pub title: String,
    pub content: String,
    pub confidence: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub room_id: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomLearningBatch {
    pub room_id: String,
    pub learnings: Vec<RoomLearning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ApiFailure,
    Timeout,
    RateLimited,
    LowConfidence,
    Contradictions,
    NoResults,
    Validation,
    DepthExceeded,
    ContextOverflow,
    InstrumentFailure,
    ArrangementFailure,
    ToolFailure,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    pub error_message: String,
    #[serde(default)]
    pub was_recovered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: ErrorCategory,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    pub occurrence_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub suggested_action: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorStats {
    pub total_errors: u64,
    pub errors_by_category: HashMap<String, u64>,
    pub errors_by_severity: HashMap<String, u64>,
    pub errors_by_instrument: HashMap<String, u64>,
    pub recovery_rate: f64,
    pub patterns_detected: u64,
}

/// Per-task event emitted onto the Event Bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Started {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
    Iteration {
        task_id: String,
        timestamp: DateTime<Utc>,
        iteration: u32,
        summary: String,
    },
    Complete {
        task_id: String,
        timestamp: DateTime<Utc>,
        response: TaskResponse,
    },
    Error {
        task_id: String,
        timestamp: DateTime<Utc>,
        message: String,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Started { task_id, .. }
            | TaskEvent::Iteration { task_id, .. }
            | TaskEvent::Complete { task_id, .. }
            | TaskEvent::Error { task_id, .. } => task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Complete { .. } | TaskEvent::Error { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Started { .. } => "started",
            TaskEvent::Iteration { .. } => "iteration",
            TaskEvent::Complete { .. } => "complete",
            TaskEvent::Error { .. } => "error",
        }
    }
}

// -- Identity, intent classification, and other additive surface area --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Factual,
    Research,
    Creative,
    Action,
    Conversational,
    Unknown,
}

impl IntentType {
    /// Cheap keyword classification, good enough to steer intervention
    /// messaging; not a substitute for the instrument routing decision.
    pub fn classify(query: &str) -> Self {
        let lower = query.to_lowercase();
        const RESEARCH: &[&str] = &["research", "investigate", "compare", "analyze", "difference between"];
        const CREATIVE: &[&str] = &["write", "draft", "compose", "brainstorm", "imagine"];
        const ACTION: &[&str] = &["remind", "schedule", "send", "create", "delete", "set up", "cancel"];
        const CONVERSATIONAL: &[&str] = &["hi", "hello", "thanks", "how are you"];

        if RESEARCH.iter().any(|k| lower.contains(k)) {
            IntentType::Research
        } else if CREATIVE.iter().any(|k| lower.contains(k)) {
            IntentType::Creative
        } else if ACTION.iter().any(|k| lower.contains(k)) {
            IntentType::Action
        } else if CONVERSATIONAL.iter().any(|k| lower.contains(k)) {
            IntentType::Conversational
        } else if lower.trim_end().ends_with('?') || lower.starts_with("what") || lower.starts_with("who")
            || lower.starts_with("when") || lower.starts_with("where") || lower.starts_with("why")
            || lower.starts_with("how")
        {
            IntentType::Factual
        } else {
            IntentType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::Factual => "factual",
            IntentType::Research => "research",
            IntentType::Creative => "creative",
            IntentType::Action => "action",
            IntentType::Conversational => "conversational",
            IntentType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub app_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedArrangement {
    pub name: String,
    pub description: String,
    pub composition: crate::composition::Composition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub app_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
