//! Core types and error definitions for the Switchboard orchestration engine.
//!
//! This crate provides the foundational pieces shared by the learning and
//! orchestration crates: the error taxonomy, an injectable wall clock, the
//! typed event bus, and the metrics sink abstraction.
//!
//! # Main types
//!
//! - [`SwitchboardError`] — Unified error enum for all Switchboard subsystems.
//! - [`SwitchboardResult`] — Convenience alias for `Result<T, SwitchboardError>`.
//! - [`Clock`] — Source of wall-clock time ([`SystemClock`], [`ManualClock`]).
//! - [`EventBus`] — Broadcast bus carrying [`OrchestrationEvent`]s.
//! - [`MetricsSink`] — Counter sink ([`InMemoryMetrics`], [`NoopMetrics`]).

/// Wall-clock abstraction.
pub mod clock;
/// Typed event bus.
pub mod event;
/// Counter metrics.
pub mod metrics;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{EventBus, OrchestrationEvent};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};

// --- Error types ---

/// Top-level error type for the Switchboard engine.
///
/// Task-level variants carry a stable [`code`](SwitchboardError::code) that is
/// recorded on the task record when the error fails a task.
#[derive(Debug, thiserror::Error)]
pub enum SwitchboardError {
    /// A malformed submission, rejected before it reaches the queue.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No registered agent offers the required capabilities.
    #[error("No suitable agent: {0}")]
    NoSuitableAgent(String),

    /// A task stayed in progress longer than its timeout.
    #[error("Task timed out: {0}")]
    TaskTimeout(String),

    /// Generic execution failure reported by an agent.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// An operation that is not allowed from the task's current status.
    #[error("Invalid state transition: cannot {action} task {task_id} in status {from}")]
    InvalidStateTransition {
        /// The task the operation targeted.
        task_id: String,
        /// The status the task was in.
        from: String,
        /// The rejected operation.
        action: String,
    },

    /// Lookup of an unknown task, agent or workflow.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The job dispatcher refused or lost a job.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error raised inside the learning pipeline.
    #[error("Learning error: {0}")]
    Learning(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwitchboardError {
    /// Stable error code stored on failed task records.
    pub fn code(&self) -> &'static str {
        match self {
            SwitchboardError::Validation(_) => "ValidationError",
            SwitchboardError::NoSuitableAgent(_) => "NoSuitableAgent",
            SwitchboardError::TaskTimeout(_) => "TaskTimeout",
            SwitchboardError::TaskFailed(_) => "TaskFailed",
            SwitchboardError::InvalidStateTransition { .. } => "InvalidStateTransition",
            SwitchboardError::NotFound(_) => "NotFound",
            SwitchboardError::Dispatch(_) => "DispatchError",
            SwitchboardError::Config(_) => "ConfigError",
            SwitchboardError::Learning(_) => "LearningError",
            SwitchboardError::Json(_) => "JsonError",
            SwitchboardError::Io(_) => "IoError",
        }
    }

    /// Whether a task failed with this error may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwitchboardError::NoSuitableAgent(_)
                | SwitchboardError::TaskTimeout(_)
                | SwitchboardError::TaskFailed(_)
                | SwitchboardError::Dispatch(_)
        )
    }

    /// Shorthand for building an [`SwitchboardError::InvalidStateTransition`].
    pub fn invalid_transition(
        task_id: impl Into<String>,
        from: impl std::fmt::Display,
        action: impl Into<String>,
    ) -> Self {
        SwitchboardError::InvalidStateTransition {
            task_id: task_id.into(),
            from: from.to_string(),
            action: action.into(),
        }
    }
}

/// A convenience `Result` alias using [`SwitchboardError`].
pub type SwitchboardResult<T> = Result<T, SwitchboardError>;
