use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Why an agent switch was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    UserRequest,
    AgentUnavailable,
    CapabilityMismatch,
    PerformanceDegradation,
    LoadBalancing,
    Timeout,
    Escalation,
}

impl std::fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SwitchReason::UserRequest => "user_request",
            SwitchReason::AgentUnavailable => "agent_unavailable",
            SwitchReason::CapabilityMismatch => "capability_mismatch",
            SwitchReason::PerformanceDegradation => "performance_degradation",
            SwitchReason::LoadBalancing => "load_balancing",
            SwitchReason::Timeout => "timeout",
            SwitchReason::Escalation => "escalation",
        };
        write!(f, "{s}")
    }
}

/// How pressing a switch request is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

/// Workload the caller would like the target agent to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadPreference {
    #[default]
    Any,
    LeastLoaded,
    Balanced,
}

/// Selection criteria for the agent that should take over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetCriteria {
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub preferred_capabilities: Vec<String>,
    /// Agents that must not be suggested.
    #[serde(default)]
    pub exclude_agents: Vec<String>,
    #[serde(default)]
    pub min_success_rate: Option<f64>,
    #[serde(default)]
    pub workload_preference: WorkloadPreference,
}

/// What context travels with the work to the new agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPreservation {
    pub preserve_history: bool,
    pub preserve_state: bool,
    pub max_context_items: usize,
}

impl Default for ContextPreservation {
    fn default() -> Self {
        Self {
            preserve_history: true,
            preserve_state: true,
            max_context_items: 50,
        }
    }
}

/// A request to move work from one agent to another. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRequest {
    pub id: String,
    pub current_task_id: Option<String>,
    pub current_agent_id: Option<String>,
    pub reason: SwitchReason,
    #[serde(default)]
    pub target: TargetCriteria,
    #[serde(default)]
    pub context: ContextPreservation,
    pub urgency: Urgency,
    pub requested_at: DateTime<Utc>,
}

impl SwitchRequest {
    pub fn new(reason: SwitchReason, urgency: Urgency, requested_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            current_task_id: None,
            current_agent_id: None,
            reason,
            target: TargetCriteria::default(),
            context: ContextPreservation::default(),
            urgency,
            requested_at,
        }
    }

    pub fn from_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.current_agent_id = Some(agent_id.into());
        self
    }

    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.current_task_id = Some(task_id.into());
        self
    }

    pub fn with_target(mut self, target: TargetCriteria) -> Self {
        self.target = target;
        self
    }

    /// JSON view of the request that pattern conditions are evaluated against.
    ///
    /// Besides the serialized fields it exposes `hour_of_day` (0-23, taken
    /// from `requested_at`) so time-based patterns can match.
    pub fn match_context(&self) -> serde_json::Value {
        use chrono::Timelike;

        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let serde_json::Value::Object(map) = &mut value {
            map.insert(
                "hour_of_day".to_string(),
                serde_json::Value::from(self.requested_at.hour()),
            );
        }
        value
    }
}

/// Latencies observed while performing a switch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchMetrics {
    pub handoff_latency_ms: u64,
    pub context_transfer_ms: u64,
    /// Satisfaction score in [0,1], when the caller reports one.
    #[serde(default)]
    pub satisfaction: Option<f64>,
}

/// Outcome of a performed switch. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchResult {
    pub id: String,
    pub request_id: String,
    pub success: bool,
    pub new_task_id: Option<String>,
    pub new_agent_id: Option<String>,
    #[serde(default)]
    pub metrics: SwitchMetrics,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SwitchResult {
    pub fn new(request: &SwitchRequest, success: bool, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request.id.clone(),
            success,
            new_task_id: request.current_task_id.clone(),
            new_agent_id: None,
            metrics: SwitchMetrics::default(),
            completed_at,
            duration_ms: 0,
        }
    }

    pub fn to_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.new_agent_id = Some(agent_id.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// A history entry: the request alongside the result it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub request: SwitchRequest,
    pub result: SwitchResult,
}

/// Family a learned pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Sequential,
    TimeBased,
    LoadBased,
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternType::Sequential => write!(f, "sequential"),
            PatternType::TimeBased => write!(f, "time_based"),
            PatternType::LoadBased => write!(f, "load_based"),
        }
    }
}

/// Comparison applied by a [`PatternCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    InRange,
}

/// Operand of a condition. Which variant is meaningful depends on the operator:
/// `InRange` takes a `Range`, the ordering operators take a `Number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Bool(bool),
    Number(f64),
    Range(f64, f64),
    Text(String),
}

/// A weighted predicate over a dotted field path of the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: ConditionValue,
    pub weight: f64,
}

/// What tends to happen when a pattern's conditions hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternOutcome {
    pub target_agent_id: String,
    pub success_probability: f64,
    pub avg_satisfaction: f64,
    pub avg_completion_ms: f64,
}

/// A learned condition → outcome association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPattern {
    /// Deterministic key, e.g. `sequential:agent-a->agent-b`.
    pub id: String,
    pub pattern_type: PatternType,
    pub conditions: Vec<PatternCondition>,
    pub outcomes: Vec<PatternOutcome>,
    pub frequency: u64,
    pub confidence: f64,
    pub learned_at: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
    pub success_rate: f64,
}

/// Category of a [`LearningInsight`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Warning,
    Optimization,
    Opportunity,
    Trend,
}

impl std::fmt::Display for InsightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsightKind::Warning => write!(f, "warning"),
            InsightKind::Optimization => write!(f, "optimization"),
            InsightKind::Opportunity => write!(f, "opportunity"),
            InsightKind::Trend => write!(f, "trend"),
        }
    }
}

/// Importance of a [`LearningInsight`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl InsightPriority {
    /// Sort rank, lower is more important.
    pub fn rank(self) -> u8 {
        match self {
            InsightPriority::Critical => 0,
            InsightPriority::High => 1,
            InsightPriority::Medium => 2,
            InsightPriority::Low => 3,
        }
    }
}

impl std::fmt::Display for InsightPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsightPriority::Critical => write!(f, "critical"),
            InsightPriority::High => write!(f, "high"),
            InsightPriority::Medium => write!(f, "medium"),
            InsightPriority::Low => write!(f, "low"),
        }
    }
}

/// A human-readable observation derived from the switch history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningInsight {
    pub id: String,
    pub kind: InsightKind,
    pub priority: InsightPriority,
    pub title: String,
    pub description: String,
    pub actionable: bool,
    pub suggested_actions: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub data: serde_json::Value,
    pub discovered_at: DateTime<Utc>,
}

/// Suggested agent for a switch request, with its justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub suggested_agent_id: String,
    pub success_probability: f64,
    pub expected_satisfaction: f64,
    pub expected_completion_ms: f64,
    pub confidence: f64,
    pub matched_patterns: Vec<String>,
    pub reasoning: Vec<String>,
    pub risk_factors: Vec<String>,
}

/// Aggregate view over the learner's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub total_patterns: usize,
    pub patterns_by_type: HashMap<String, usize>,
    pub average_confidence: f64,
    pub history_size: usize,
    pub overall_success_rate: f64,
    pub recent_success_rate: f64,
    /// Patterns observed within the last hour.
    pub recent_patterns: usize,
    pub insight_count: usize,
}
