//! Task orchestration for the Switchboard engine.
//!
//! Holds submitted tasks in a priority queue, assigns them to capable agents
//! on a periodic tick, supervises each task through its lifecycle (timeouts,
//! cancellation, retry) and runs multi-agent tasks as sequential workflows.
//! Finished tasks feed the switch pattern learner, whose predictions can in
//! turn bias agent selection.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Facade wiring the task manager, learner and background loops.
//! - [`TaskManager`] — Task state machine, timeouts and workflow supervision.
//! - [`TaskQueue`] — Priority queue, FIFO within a priority.
//! - [`AgentRegistry`] — Agent lookup and stats ([`InMemoryAgentRegistry`]).
//! - [`JobDispatcher`] — Hands jobs to agents ([`InMemoryDispatcher`]).
//! - [`WorkflowExecutor`] — Plans and runs multi-agent workflows.
//! - [`Scheduler`] — Cron-based maintenance jobs.

/// Orchestrator configuration.
pub mod config;
/// Job dispatch to agents.
pub mod dispatch;
/// Orchestrator facade and background loops.
pub mod engine;
/// Task lifecycle state machine.
pub mod lifecycle;
/// Agent availability and performance tracking.
pub mod monitor;
/// Agent registry.
pub mod registry;
/// Cron-based maintenance scheduler.
pub mod scheduler;
/// Ordered assignment rules.
pub mod strategy;
/// Priority task queue.
pub mod task_queue;
/// Task and workflow types.
pub mod types;
/// Multi-agent workflow execution.
pub mod workflow;

pub use config::OrchestratorConfig;
pub use dispatch::{DispatchedJob, InMemoryDispatcher, JobDispatcher, EXECUTE_TASK_JOB};
pub use engine::{Orchestrator, OrchestratorBuilder};
pub use lifecycle::{Assignment, LifecycleSettings, ManagerDeps, TaskManager};
pub use monitor::AgentMonitor;
pub use registry::{
    Agent, AgentCandidate, AgentPerformance, AgentRegistry, AgentRequirements, AgentStatus,
    InMemoryAgentRegistry,
};
pub use scheduler::{MaintenanceJob, ScheduledJob, Scheduler};
pub use strategy::{RuleAction, RuleCondition, StrategyRule};
pub use task_queue::TaskQueue;
pub use types::{
    NewTask, Priority, QueueStats, StepStatus, Task, TaskError, TaskKind, TaskStatus,
    WorkflowExecution, WorkflowStatus, WorkflowStep,
};
pub use workflow::{SimulatedStepRunner, StepRunner, WorkflowExecutor};
