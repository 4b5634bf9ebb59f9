use crate::registry::{AgentPerformance, AgentRegistry, AgentStatus};
use std::sync::Arc;
use switchboard_core::SwitchboardResult;
use tracing::warn;

/// Load added on assignment and removed when the agent finishes.
pub const LOAD_STEP: f64 = 0.1;

/// Tracks agent availability and performance through the registry.
///
/// Registry failures are logged and swallowed: a missing agent must not
/// block the task state machine.
#[derive(Clone)]
pub struct AgentMonitor {
    registry: Arc<dyn AgentRegistry>,
}

impl AgentMonitor {
    pub fn new(registry: Arc<dyn AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Mark an agent as working on a task.
    pub async fn start_task(&self, agent_id: &str) {
        self.apply(agent_id, AgentStatus::Busy, |p| {
            p.current_load = (p.current_load + LOAD_STEP).min(1.0);
        })
        .await;
    }

    /// Mark an agent idle after a success and fold `response_ms` into its stats.
    pub async fn record_success(&self, agent_id: &str, response_ms: u64) {
        self.apply(agent_id, AgentStatus::Idle, |p| {
            let n = p.tasks_completed as f64;
            p.avg_response_time_ms = (p.avg_response_time_ms * n + response_ms as f64) / (n + 1.0);
            p.tasks_completed += 1;
            p.success_rate = success_rate(p);
            p.current_load = (p.current_load - LOAD_STEP).max(0.0);
        })
        .await;
    }

    /// Mark an agent idle after a failure and count it.
    pub async fn record_failure(&self, agent_id: &str) {
        self.apply(agent_id, AgentStatus::Idle, |p| {
            p.tasks_failed += 1;
            p.success_rate = success_rate(p);
            p.current_load = (p.current_load - LOAD_STEP).max(0.0);
        })
        .await;
    }

    /// Return an agent to idle and drop the load of the abandoned task,
    /// leaving its completed and failed counts alone.
    pub async fn release(&self, agent_id: &str) {
        self.apply(agent_id, AgentStatus::Idle, |p| {
            p.current_load = (p.current_load - LOAD_STEP).max(0.0);
        })
        .await;
    }

    async fn apply(&self, agent_id: &str, status: AgentStatus, f: impl FnOnce(&mut AgentPerformance)) {
        if let Err(e) = self.try_apply(agent_id, status, f).await {
            warn!(agent_id, error = %e, "Failed to update agent");
        }
    }

    async fn try_apply(
        &self,
        agent_id: &str,
        status: AgentStatus,
        f: impl FnOnce(&mut AgentPerformance),
    ) -> SwitchboardResult<()> {
        self.registry.update_agent_status(agent_id, status).await?;
        if let Some(agent) = self.registry.get_agent(agent_id).await? {
            let mut performance = agent.performance;
            f(&mut performance);
            self.registry
                .update_agent_performance(agent_id, performance)
                .await?;
        }
        Ok(())
    }
}

fn success_rate(p: &AgentPerformance) -> f64 {
    let finished = p.tasks_completed + p.tasks_failed;
    if finished == 0 {
        1.0
    } else {
        p.tasks_completed as f64 / finished as f64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::{Agent, InMemoryAgentRegistry};

    fn setup() -> (Arc<InMemoryAgentRegistry>, AgentMonitor) {
        let registry = Arc::new(InMemoryAgentRegistry::with_agents([Agent::new("a", &["x"])]));
        let monitor = AgentMonitor::new(registry.clone());
        (registry, monitor)
    }

    #[tokio::test]
    async fn test_start_task_marks_busy_and_adds_load() {
        let (registry, monitor) = setup();
        monitor.start_task("a").await;
        let agent = registry.get_agent("a").await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Busy);
        assert!((agent.performance.current_load - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_load_is_capped() {
        let (registry, monitor) = setup();
        for _ in 0..15 {
            monitor.start_task("a").await;
        }
        let agent = registry.get_agent("a").await.unwrap().unwrap();
        assert!((agent.performance.current_load - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_record_success_updates_running_average() {
        let (registry, monitor) = setup();
        monitor.start_task("a").await;
        monitor.record_success("a", 1000).await;
        monitor.start_task("a").await;
        monitor.record_success("a", 3000).await;

        let agent = registry.get_agent("a").await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.performance.tasks_completed, 2);
        assert!((agent.performance.avg_response_time_ms - 2000.0).abs() < 1e-9);
        assert!(agent.performance.current_load.abs() < 1e-9);
        assert_eq!(agent.performance.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_record_failure_lowers_success_rate() {
        let (registry, monitor) = setup();
        monitor.record_success("a", 100).await;
        monitor.record_failure("a").await;
        let agent = registry.get_agent("a").await.unwrap().unwrap();
        assert_eq!(agent.performance.tasks_failed, 1);
        assert!((agent.performance.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(agent.performance.current_load, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_agent_is_ignored() {
        let (_, monitor) = setup();
        monitor.start_task("ghost").await;
        monitor.record_failure("ghost").await;
        monitor.release("ghost").await;
    }

    #[tokio::test]
    async fn test_release_drops_load_and_keeps_stats() {
        let (registry, monitor) = setup();
        monitor.record_success("a", 500).await;
        for _ in 0..5 {
            monitor.start_task("a").await;
            monitor.release("a").await;
        }
        let agent = registry.get_agent("a").await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.performance.current_load.abs() < 1e-9);
        assert_eq!(agent.performance.tasks_completed, 1);
        assert_eq!(agent.performance.tasks_failed, 0);
        assert!((agent.performance.avg_response_time_ms - 500.0).abs() < 1e-9);

        monitor.release("a").await;
        let agent = registry.get_agent("a").await.unwrap().unwrap();
        assert_eq!(agent.performance.current_load, 0.0);
    }
}
