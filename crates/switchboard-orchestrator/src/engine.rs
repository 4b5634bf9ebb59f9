use crate::config::OrchestratorConfig;
use crate::dispatch::JobDispatcher;
use crate::lifecycle::{Assignment, LifecycleSettings, ManagerDeps, TaskManager};
use crate::registry::AgentRegistry;
use crate::scheduler::Scheduler;
use crate::types::{NewTask, QueueStats, Task, TaskStatus, WorkflowExecution};
use crate::workflow::{SimulatedStepRunner, StepRunner};
use parking_lot::Mutex;
use std::sync::Arc;
use switchboard_core::{
    Clock, EventBus, MetricsSink, NoopMetrics, OrchestrationEvent, SwitchboardError,
    SwitchboardResult, SystemClock,
};
use switchboard_learning::{
    LearningInsight, LearningStats, LearningSummary, OptimizationReport, PredictionResult,
    SwitchPattern, SwitchPatternLearner, SwitchRequest, SwitchResult,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Builds an [`Orchestrator`] from its config and collaborators.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    registry: Arc<dyn AgentRegistry>,
    dispatcher: Arc<dyn JobDispatcher>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    step_runner: Option<Arc<dyn StepRunner>>,
    events: Option<EventBus>,
}

impl OrchestratorBuilder {
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the simulated workflow step runner.
    pub fn step_runner(mut self, runner: Arc<dyn StepRunner>) -> Self {
        self.step_runner = Some(runner);
        self
    }

    /// Share an existing event bus instead of creating one.
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> SwitchboardResult<Orchestrator> {
        self.config.validate()?;
        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(self.config.event_capacity));
        let learner = Arc::new(SwitchPatternLearner::new(
            self.config.learning.clone(),
            self.clock.clone(),
            events.clone(),
        ));
        let step_runner = self
            .step_runner
            .unwrap_or_else(|| Arc::new(SimulatedStepRunner::new(self.config.step_delay())));
        let manager = TaskManager::new(
            LifecycleSettings::from_config(&self.config),
            ManagerDeps {
                registry: self.registry,
                dispatcher: self.dispatcher,
                step_runner,
                learner: learner.clone(),
                events: events.clone(),
                metrics: self.metrics.clone(),
                clock: self.clock.clone(),
            },
        );
        Ok(Orchestrator {
            config: self.config,
            manager,
            learner,
            events,
            metrics: self.metrics,
            clock: self.clock,
            handles: Mutex::new(Vec::new()),
        })
    }
}

/// Entry point tying the task manager, the learner and the background
/// loops together.
pub struct Orchestrator {
    config: OrchestratorConfig,
    manager: TaskManager,
    learner: Arc<SwitchPatternLearner>,
    events: EventBus,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn builder(
        config: OrchestratorConfig,
        registry: Arc<dyn AgentRegistry>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            registry,
            dispatcher,
            metrics: Arc::new(NoopMetrics),
            clock: Arc::new(SystemClock),
            step_runner: None,
            events: None,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.manager
    }

    pub fn learner(&self) -> &Arc<SwitchPatternLearner> {
        &self.learner
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.events.subscribe()
    }

    /// Spawn the dispatch ticker and the maintenance scheduler.
    /// Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }

        let manager = self.manager.clone();
        let period = self.config.tick_interval();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                manager.tick().await;
            }
        }));

        let scheduler = Scheduler::new(self.config.maintenance.clone());
        let jobs = scheduler.enabled_jobs().len();
        handles.push(scheduler.start(self.learner.clone(), self.clock.clone()));

        info!(
            tick_ms = self.config.tick_interval_ms,
            maintenance_jobs = jobs,
            "Orchestrator started"
        );
    }

    /// Stop the background loops, cancel in-flight tasks and forget all state.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in handles {
            handle.abort();
        }
        self.manager.shutdown().await;
        self.learner.clear();
        info!("Orchestrator shut down");
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty()
    }

    // --- Task operations ---

    pub async fn submit(&self, task: NewTask) -> SwitchboardResult<Task> {
        self.manager.submit(task).await
    }

    pub async fn tick(&self) -> Option<String> {
        self.manager.tick().await
    }

    pub async fn assign(&self, task_id: &str) -> SwitchboardResult<Assignment> {
        self.manager.assign(task_id).await
    }

    pub async fn complete(&self, task_id: &str, result: serde_json::Value) -> bool {
        self.manager.complete(task_id, result).await
    }

    pub async fn fail(&self, task_id: &str, error: SwitchboardError) -> bool {
        self.manager.fail(task_id, error).await
    }

    /// Complete unless `attempt` has been superseded by a retry.
    pub async fn complete_attempt(
        &self,
        task_id: &str,
        attempt: u32,
        result: serde_json::Value,
    ) -> bool {
        self.manager.complete_attempt(task_id, attempt, result).await
    }

    /// Fail unless `attempt` has been superseded by a retry.
    pub async fn fail_attempt(&self, task_id: &str, attempt: u32, error: SwitchboardError) -> bool {
        self.manager.fail_attempt(task_id, attempt, error).await
    }

    pub async fn cancel(&self, task_id: &str, reason: &str) -> SwitchboardResult<()> {
        self.manager.cancel(task_id, reason).await
    }

    pub async fn retry(&self, task_id: &str) -> SwitchboardResult<Task> {
        self.manager.retry(task_id).await
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.manager.get_task(task_id).await
    }

    pub async fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        self.manager.list_tasks(status).await
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.manager.queue_stats().await
    }

    pub fn get_workflow(&self, task_id: &str) -> Option<WorkflowExecution> {
        self.manager.get_workflow(task_id)
    }

    // --- Learning operations ---

    /// Record a switch performed outside the task lifecycle.
    pub fn record_switch(&self, request: SwitchRequest, result: SwitchResult) -> LearningSummary {
        let reason = request.reason.to_string();
        let status = if result.success { "success" } else { "failure" };
        self.metrics.increment(
            "agent_switches_total",
            &[
                ("queue", self.config.queue_name.as_str()),
                ("reason", reason.as_str()),
                ("status", status),
            ],
        );
        self.learner.learn_from_result(result, request)
    }

    pub fn predict(&self, request: &SwitchRequest) -> Option<PredictionResult> {
        self.learner.predict(request)
    }

    pub fn optimize_patterns(&self) -> OptimizationReport {
        self.learner.optimize()
    }

    pub fn prune_insights(&self) -> usize {
        self.learner.prune_insights()
    }

    pub fn patterns(&self) -> Vec<SwitchPattern> {
        self.learner.patterns()
    }

    pub fn insights(&self) -> Vec<LearningInsight> {
        self.learner.insights()
    }

    pub fn learning_stats(&self) -> LearningStats {
        self.learner.stats()
    }

    /// Queue, learning and event-bus state as one JSON document.
    pub async fn to_json(&self) -> serde_json::Value {
        let stats = self.queue_stats().await;
        let learning = self.learning_stats();
        serde_json::json!({
            "queue": stats,
            "learning": learning,
            "running": self.is_running(),
            "subscribers": self.events.subscriber_count(),
        })
    }
}
