use crate::monitor::AgentMonitor;
use crate::registry::AgentRegistry;
use crate::types::{StepStatus, Task, WorkflowExecution, WorkflowStatus, WorkflowStep};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{Clock, SwitchboardError, SwitchboardResult};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Executes one workflow step on its agent.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(&self, step: &WorkflowStep) -> SwitchboardResult<serde_json::Value>;
}

/// Stands in for agent work: waits a fixed delay and echoes the step.
#[derive(Debug, Clone)]
pub struct SimulatedStepRunner {
    delay: Duration,
}

impl SimulatedStepRunner {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedStepRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

#[async_trait]
impl StepRunner for SimulatedStepRunner {
    async fn run_step(&self, step: &WorkflowStep) -> SwitchboardResult<serde_json::Value> {
        tokio::time::sleep(self.delay).await;
        Ok(serde_json::json!({
            "step": step.id,
            "agent_id": step.agent_id,
            "capability": step.capability,
            "status": "completed",
        }))
    }
}

/// Plans multi-agent tasks as one step per capability and runs the steps
/// in order, stopping at the first failure.
#[derive(Clone)]
pub struct WorkflowExecutor {
    registry: Arc<dyn AgentRegistry>,
    monitor: AgentMonitor,
    runner: Arc<dyn StepRunner>,
    clock: Arc<dyn Clock>,
}

impl WorkflowExecutor {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        monitor: AgentMonitor,
        runner: Arc<dyn StepRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            monitor,
            runner,
            clock,
        }
    }

    /// Bind each required capability of `task` to the first agent offering it.
    pub async fn plan(&self, task: &Task) -> SwitchboardResult<WorkflowExecution> {
        let mut steps = Vec::with_capacity(task.required_capabilities.len());
        for (index, capability) in task.required_capabilities.iter().enumerate() {
            let agent = self
                .registry
                .get_agents_by_capability(capability)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    SwitchboardError::NoSuitableAgent(format!(
                        "no agent offers capability '{capability}' for workflow {}",
                        task.id
                    ))
                })?;
            steps.push(WorkflowStep {
                id: format!("{}-step-{}", task.id, index + 1),
                capability: capability.clone(),
                agent_id: agent.id,
                input: serde_json::json!({
                    "task_id": task.id,
                    "capability": capability,
                    "input": task.input,
                }),
                status: StepStatus::Pending,
                output: None,
                error: None,
            });
        }

        Ok(WorkflowExecution {
            id: Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            steps,
            current_step: 0,
            status: WorkflowStatus::Pending,
            started_at: None,
            completed_at: None,
        })
    }

    /// Run every step of `execution` in order.
    ///
    /// `on_progress` sees the execution after each state change. On success
    /// returns the step outputs; on failure the failed step and every later
    /// step are marked failed and a `TaskFailed` error is returned.
    pub async fn run(
        &self,
        execution: &mut WorkflowExecution,
        on_progress: &(dyn Fn(&WorkflowExecution) + Send + Sync),
    ) -> SwitchboardResult<Vec<serde_json::Value>> {
        execution.status = WorkflowStatus::Running;
        execution.started_at = Some(self.clock.now());
        on_progress(execution);

        let mut outputs = Vec::with_capacity(execution.steps.len());
        for index in 0..execution.steps.len() {
            execution.current_step = index;
            execution.steps[index].status = StepStatus::InProgress;
            on_progress(execution);

            let step = execution.steps[index].clone();
            self.monitor.start_task(&step.agent_id).await;
            let started = Instant::now();
            let outcome = self.runner.run_step(&step).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    self.monitor.record_success(&step.agent_id, elapsed_ms).await;
                    info!(
                        workflow = %execution.id,
                        step = %step.id,
                        agent_id = %step.agent_id,
                        elapsed_ms,
                        "Workflow step completed"
                    );
                    execution.steps[index].status = StepStatus::Completed;
                    execution.steps[index].output = Some(output.clone());
                    outputs.push(output);
                    on_progress(execution);
                }
                Err(e) => {
                    self.monitor.record_failure(&step.agent_id).await;
                    warn!(
                        workflow = %execution.id,
                        step = %step.id,
                        agent_id = %step.agent_id,
                        error = %e,
                        "Workflow step failed"
                    );
                    execution.steps[index].status = StepStatus::Failed;
                    execution.steps[index].error = Some(e.to_string());
                    for later in execution.steps.iter_mut().skip(index + 1) {
                        later.status = StepStatus::Failed;
                        later.error = Some("skipped after an earlier step failed".into());
                    }
                    execution.status = WorkflowStatus::Failed;
                    execution.completed_at = Some(self.clock.now());
                    on_progress(execution);
                    return Err(SwitchboardError::TaskFailed(format!(
                        "workflow step {} ({}) failed: {e}",
                        step.id, step.capability
                    )));
                }
            }
        }

        execution.status = WorkflowStatus::Completed;
        execution.completed_at = Some(self.clock.now());
        on_progress(execution);
        Ok(outputs)
    }
}
