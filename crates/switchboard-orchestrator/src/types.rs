use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use switchboard_core::{SwitchboardError, SwitchboardResult};

/// Scheduling priority. `Critical` is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    Urgent,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Queue rank: lower is dequeued first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::Urgent => 1,
            Priority::High => 2,
            Priority::Medium => 3,
            Priority::Low => 4,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::Urgent => write!(f, "urgent"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Whether a task runs on one agent or as a multi-step workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Simple,
    MultiAgentWorkflow,
}

/// Status of a task in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Waiting in the queue for dispatch.
    pub fn is_waiting(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Queued)
    }

    /// Owned by an agent or workflow.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Failure recorded on a task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub occurred_at: DateTime<Utc>,
}

impl TaskError {
    pub fn from_error(err: &SwitchboardError, at: DateTime<Utc>) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            occurred_at: at,
        }
    }
}

/// A submission, as received from a caller.
///
/// Fields are optional here so that a malformed submission can be rejected
/// with a [`SwitchboardError::Validation`] instead of failing to deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<TaskKind>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl NewTask {
    pub fn simple(id: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            id: id.into(),
            kind: Some(TaskKind::Simple),
            priority: None,
            required_capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            input: serde_json::Value::Null,
        }
    }

    pub fn workflow(id: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            kind: Some(TaskKind::MultiAgentWorkflow),
            ..Self::simple(id, capabilities)
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    pub fn validate(&self) -> SwitchboardResult<()> {
        if self.id.trim().is_empty() {
            return Err(SwitchboardError::Validation("task id is required".into()));
        }
        if self.kind.is_none() {
            return Err(SwitchboardError::Validation(format!(
                "task {} is missing a type",
                self.id
            )));
        }
        if self.required_capabilities.is_empty() {
            return Err(SwitchboardError::Validation(format!(
                "task {} must require at least one capability",
                self.id
            )));
        }
        if self.required_capabilities.iter().any(|c| c.trim().is_empty()) {
            return Err(SwitchboardError::Validation(format!(
                "task {} has a blank capability",
                self.id
            )));
        }
        Ok(())
    }
}

/// A task tracked by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub priority: Priority,
    pub required_capabilities: Vec<String>,
    pub input: serde_json::Value,
    pub assigned_agent_id: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<TaskError>,
    /// Number of explicit retries so far.
    pub retries: u32,
    /// Bumped on every assignment; stale timers compare against it.
    #[serde(default)]
    pub attempt: u32,
}

impl Task {
    /// Build a task from a submission that already passed validation.
    pub(crate) fn from_submission(new: NewTask, kind: TaskKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            kind,
            priority: new.priority.unwrap_or_default(),
            required_capabilities: new.required_capabilities,
            input: new.input,
            assigned_agent_id: None,
            status: TaskStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retries: 0,
            attempt: 0,
        }
    }
}

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Status of a single workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One agent-bound step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub capability: String,
    pub agent_id: String,
    pub input: serde_json::Value,
    pub status: StepStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Sequential decomposition of a multi-agent task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub task_id: String,
    pub steps: Vec<WorkflowStep>,
    pub current_step: usize,
    pub status: WorkflowStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Snapshot of queue and task counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
}
