//! Simulated agent fleet.
//!
//! Agents are not real processes here: a worker drains the dispatcher
//! channel, waits `work_ms` per job and reports the outcome back to the
//! orchestrator, failing every `fail_every`-th job when configured.
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::SwitchboardError;
use switchboard_orchestrator::{
    Agent, DispatchedJob, NewTask, Orchestrator, OrchestratorConfig, Task, TaskStatus,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub tasks: Vec<NewTask>,
}

impl SwitchboardConfig {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.orchestrator.validate()?;
        if self.agents.is_empty() {
            anyhow::bail!("at least one [[agents]] entry is required");
        }
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                anyhow::bail!("agent id must not be empty");
            }
        }
        for task in &self.tasks {
            task.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Time an agent spends on each job.
    #[serde(default = "default_work_ms")]
    pub work_ms: u64,
    /// Fail every n-th job; 0 disables failures.
    #[serde(default)]
    pub fail_every: u64,
    /// Retries granted to a failed task before it is left failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Give up waiting after this many seconds.
    #[serde(default = "default_max_runtime_secs")]
    pub max_runtime_secs: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            work_ms: default_work_ms(),
            fail_every: 0,
            max_retries: default_max_retries(),
            max_runtime_secs: default_max_runtime_secs(),
        }
    }
}

fn default_work_ms() -> u64 {
    200
}
fn default_max_retries() -> u32 {
    2
}
fn default_max_runtime_secs() -> u64 {
    60
}

/// Whether a task has reached a status it will not leave on its own.
pub fn is_settled(task: &Task, max_retries: u32) -> bool {
    match task.status {
        TaskStatus::Completed | TaskStatus::Cancelled => true,
        TaskStatus::Failed => task.retries >= max_retries,
        _ => false,
    }
}

/// Consume dispatched jobs and report outcomes back to the orchestrator.
pub fn spawn_worker(
    orchestrator: Arc<Orchestrator>,
    mut jobs: mpsc::UnboundedReceiver<DispatchedJob>,
    simulation: SimulationConfig,
) -> JoinHandle<()> {
    let counter = Arc::new(AtomicU64::new(0));
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            let Some(task_id) = job.task_id().map(str::to_string) else {
                warn!(job_type = %job.job_type, "Job without task_id, dropping");
                continue;
            };
            let agent_id = job.agent_id().unwrap_or("unknown").to_string();
            let Some(attempt) = job.attempt() else {
                warn!(task_id = %task_id, "Job without attempt, dropping");
                continue;
            };
            let orchestrator = orchestrator.clone();
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            let fail = simulation.fail_every > 0 && n % simulation.fail_every == 0;
            let work = Duration::from_millis(simulation.work_ms);
            tokio::spawn(async move {
                tokio::time::sleep(work).await;
                let applied = if fail {
                    let err = SwitchboardError::TaskFailed(format!("{agent_id} gave up on job {n}"));
                    orchestrator.fail_attempt(&task_id, attempt, err).await
                } else {
                    let output = serde_json::json!({ "agent": agent_id, "job": n });
                    orchestrator.complete_attempt(&task_id, attempt, output).await
                };
                debug!(task_id = %task_id, attempt, failed = fail, applied, "Job finished");
            });
        }
    })
}

/// Retry failed tasks that still have retries left. Returns how many were retried.
pub async fn retry_failed(orchestrator: &Orchestrator, max_retries: u32) -> usize {
    let mut retried = 0;
    for task in orchestrator.list_tasks(Some(TaskStatus::Failed)).await {
        if task.retries >= max_retries {
            continue;
        }
        match orchestrator.retry(&task.id).await {
            Ok(_) => retried += 1,
            Err(e) => warn!(task_id = %task.id, error = %e, "Retry rejected"),
        }
    }
    retried
}

/// Poll until every task is settled or `deadline` passes.
pub async fn wait_until_settled(
    orchestrator: &Orchestrator,
    simulation: &SimulationConfig,
    poll: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(simulation.max_runtime_secs);
    loop {
        retry_failed(orchestrator, simulation.max_retries).await;
        let tasks = orchestrator.list_tasks(None).await;
        if tasks.iter().all(|t| is_settled(t, simulation.max_retries)) {
            info!(tasks = tasks.len(), "All tasks settled");
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                max_runtime_secs = simulation.max_runtime_secs,
                "Simulation deadline reached with tasks still open"
            );
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}
