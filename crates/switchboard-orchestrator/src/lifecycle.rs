use crate::config::OrchestratorConfig;
use crate::dispatch::{JobDispatcher, EXECUTE_TASK_JOB};
use crate::monitor::AgentMonitor;
use crate::registry::{AgentCandidate, AgentRegistry, AgentRequirements};
use crate::strategy::{apply_rules, StrategyRule};
use crate::task_queue::TaskQueue;
use crate::types::{
    NewTask, Priority, QueueStats, Task, TaskError, TaskKind, TaskStatus, WorkflowExecution,
};
use crate::workflow::{StepRunner, WorkflowExecutor};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{
    Clock, EventBus, MetricsSink, OrchestrationEvent, SwitchboardError, SwitchboardResult,
};
use switchboard_learning::{
    SwitchPatternLearner, SwitchReason, SwitchRequest, SwitchResult, TargetCriteria, Urgency,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Settings the lifecycle manager reads from [`OrchestratorConfig`].
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Dispatcher queue simple-task jobs go to.
    pub queue_name: String,
    /// How long an assignment may stay in flight before it fails.
    pub task_timeout: Duration,
    /// Consult the learner before falling back to score order.
    pub use_predictions: bool,
    /// Rules tried before predictions and scoring.
    pub strategy: Vec<StrategyRule>,
}

impl LifecycleSettings {
    /// Pick the lifecycle fields out of `config`.
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            queue_name: config.queue_name.clone(),
            task_timeout: config.task_timeout(),
            use_predictions: config.use_predictions,
            strategy: config.strategy.clone(),
        }
    }
}

/// Collaborators injected into the [`TaskManager`].
#[derive(Clone)]
pub struct ManagerDeps {
    /// Agent lookup and status updates.
    pub registry: Arc<dyn AgentRegistry>,
    /// Receives one job per simple-task assignment.
    pub dispatcher: Arc<dyn JobDispatcher>,
    /// Executes workflow steps.
    pub step_runner: Arc<dyn StepRunner>,
    /// Learns from finished tasks and biases agent selection.
    pub learner: Arc<SwitchPatternLearner>,
    /// Task lifecycle events are published here.
    pub events: EventBus,
    /// Counters labelled with the queue name.
    pub metrics: Arc<dyn MetricsSink>,
    /// Source of every task and workflow timestamp.
    pub clock: Arc<dyn Clock>,
}

/// Outcome of a successful assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The assigned task.
    pub task_id: String,
    /// The single agent for simple tasks; `None` for workflows.
    pub agent_id: Option<String>,
    /// Execution id of the started workflow; `None` for simple tasks.
    pub workflow_id: Option<String>,
}

#[derive(Default)]
struct LifecycleState {
    tasks: HashMap<String, Task>,
    queue: TaskQueue,
    processing: HashSet<String>,
    timers: HashMap<String, JoinHandle<()>>,
    workflow_runs: HashMap<String, JoinHandle<()>>,
    /// Agent that most recently finished a task; the "from" side of the next switch.
    last_handler: Option<String>,
}

struct Inner {
    settings: LifecycleSettings,
    registry: Arc<dyn AgentRegistry>,
    dispatcher: Arc<dyn JobDispatcher>,
    monitor: AgentMonitor,
    executor: WorkflowExecutor,
    learner: Arc<SwitchPatternLearner>,
    events: EventBus,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    state: Mutex<LifecycleState>,
    workflows: Arc<RwLock<HashMap<String, WorkflowExecution>>>,
}

/// Owns every task record and drives the task state machine.
///
/// ```text
/// PENDING → QUEUED → ASSIGNED → IN_PROGRESS → COMPLETED | FAILED | CANCELLED
/// FAILED → PENDING (retry only)
/// ```
///
/// All state sits behind one async mutex, so the dispatch tick, timeout
/// timers, workflow runners and external callers observe transitions in a
/// single order. Cheap to clone.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    /// Wire up a manager with empty state. Nothing runs until `tick` or `assign`.
    pub fn new(settings: LifecycleSettings, deps: ManagerDeps) -> Self {
        let monitor = AgentMonitor::new(deps.registry.clone());
        let executor = WorkflowExecutor::new(
            deps.registry.clone(),
            monitor.clone(),
            deps.step_runner,
            deps.clock.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                settings,
                registry: deps.registry,
                dispatcher: deps.dispatcher,
                monitor,
                executor,
                learner: deps.learner,
                events: deps.events,
                metrics: deps.metrics,
                clock: deps.clock,
                state: Mutex::new(LifecycleState::default()),
                workflows: Arc::new(RwLock::new(HashMap::new())),
            }),
        }
    }

    /// Validate a submission and put it on the queue.
    pub async fn submit(&self, new: NewTask) -> SwitchboardResult<Task> {
        if let Err(e) = new.validate() {
            warn!(task_id = %new.id, error = %e, "Task submission rejected");
            return Err(e);
        }
        let kind = new
            .kind
            .ok_or_else(|| SwitchboardError::Validation("task type is required".into()))?;

        let now = self.inner.clock.now();
        let mut st = self.inner.state.lock().await;
        if st.tasks.contains_key(&new.id) {
            return Err(SwitchboardError::Validation(format!(
                "task {} already exists",
                new.id
            )));
        }

        let mut task = Task::from_submission(new, kind, now);
        let position = st.queue.enqueue(task.id.clone(), task.priority);
        task.status = TaskStatus::Queued;
        st.tasks.insert(task.id.clone(), task.clone());
        let queued = st.queue.len();
        drop(st);

        info!(
            task_id = %task.id,
            priority = %task.priority,
            position,
            queued,
            "Task submitted"
        );
        self.inner.events.publish(OrchestrationEvent::TaskSubmitted {
            task_id: task.id.clone(),
            priority: task.priority.to_string(),
            timestamp: now,
        });
        self.count(
            "tasks_submitted_total",
            &[("priority", task.priority.to_string().as_str())],
        );
        Ok(task)
    }

    /// Pop the head of the queue and assign it.
    ///
    /// Assignment errors fail the task instead of propagating, so a tick
    /// never aborts the dispatch loop. Returns the id of the processed task.
    pub async fn tick(&self) -> Option<String> {
        let mut st = self.inner.state.lock().await;
        let task_id = st.queue.pop()?;
        if let Err(e) = self.assign_locked(&mut st, &task_id).await {
            let still_waiting = st
                .tasks
                .get(&task_id)
                .is_some_and(|t| t.status.is_waiting());
            if still_waiting {
                self.fail_locked(&mut st, &task_id, &e).await;
            } else {
                debug!(task_id = %task_id, error = %e, "Dequeued task no longer assignable");
            }
        }
        Some(task_id)
    }

    /// Assign a waiting task now, bypassing the queue order.
    pub async fn assign(&self, task_id: &str) -> SwitchboardResult<Assignment> {
        let mut st = self.inner.state.lock().await;
        self.assign_locked(&mut st, task_id).await
    }

    /// Record a successful result. Returns `false` when the callback was
    /// ignored (unknown, cancelled or not in progress).
    pub async fn complete(&self, task_id: &str, result: serde_json::Value) -> bool {
        let mut st = self.inner.state.lock().await;
        self.complete_locked(&mut st, task_id, result).await
    }

    /// Like [`complete`](Self::complete), but ignored unless `attempt` is
    /// the task's current assignment. Agents echo the `attempt` field of
    /// their job payload here so a late result from before a retry is dropped.
    pub async fn complete_attempt(
        &self,
        task_id: &str,
        attempt: u32,
        result: serde_json::Value,
    ) -> bool {
        let mut st = self.inner.state.lock().await;
        if superseded(&st, task_id, attempt) {
            return false;
        }
        self.complete_locked(&mut st, task_id, result).await
    }

    /// Record a failure. Returns `false` when the callback was ignored.
    pub async fn fail(&self, task_id: &str, error: SwitchboardError) -> bool {
        let mut st = self.inner.state.lock().await;
        self.fail_locked(&mut st, task_id, &error).await
    }

    /// Like [`fail`](Self::fail), but ignored unless `attempt` is the task's
    /// current assignment.
    pub async fn fail_attempt(&self, task_id: &str, attempt: u32, error: SwitchboardError) -> bool {
        let mut st = self.inner.state.lock().await;
        if superseded(&st, task_id, attempt) {
            return false;
        }
        self.fail_locked(&mut st, task_id, &error).await
    }

    /// Cancel a task that has not completed yet.
    ///
    /// A queued task leaves the queue. An in-flight task is only flagged:
    /// the agent or workflow run keeps going, and its later callbacks are
    /// ignored.
    pub async fn cancel(&self, task_id: &str, reason: &str) -> SwitchboardResult<()> {
        let mut st = self.inner.state.lock().await;
        let status = st
            .tasks
            .get(task_id)
            .map(|t| t.status)
            .ok_or_else(|| SwitchboardError::NotFound(format!("task {task_id}")))?;
        if matches!(status, TaskStatus::Completed | TaskStatus::Cancelled) {
            return Err(SwitchboardError::invalid_transition(task_id, status, "cancel"));
        }
        self.cancel_locked(&mut st, task_id, reason).await;
        Ok(())
    }

    /// Reset a failed task and put it back on the queue with status `Pending`.
    pub async fn retry(&self, task_id: &str) -> SwitchboardResult<Task> {
        let mut st = self.inner.state.lock().await;
        let status = st
            .tasks
            .get(task_id)
            .map(|t| t.status)
            .ok_or_else(|| SwitchboardError::NotFound(format!("task {task_id}")))?;
        if status != TaskStatus::Failed {
            return Err(SwitchboardError::invalid_transition(task_id, status, "retry"));
        }

        let Some(task) = st.tasks.get_mut(task_id).map(|t| {
            t.status = TaskStatus::Pending;
            t.assigned_agent_id = None;
            t.started_at = None;
            t.completed_at = None;
            t.error = None;
            t.result = None;
            t.retries += 1;
            t.clone()
        }) else {
            return Err(SwitchboardError::NotFound(format!("task {task_id}")));
        };
        st.queue.enqueue(task.id.clone(), task.priority);
        drop(st);

        info!(task_id, retries = task.retries, "Task retried");
        self.inner.events.publish(OrchestrationEvent::TaskRetried {
            task_id: task.id.clone(),
            timestamp: self.inner.clock.now(),
        });
        self.count("tasks_retried_total", &[]);
        Ok(task)
    }

    /// Snapshot of one task record.
    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.inner.state.lock().await.tasks.get(task_id).cloned()
    }

    /// Tasks in creation order, optionally filtered by status.
    pub async fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        let st = self.inner.state.lock().await;
        let mut tasks: Vec<Task> = st
            .tasks
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// Queue contents, head first.
    pub async fn queued_task_ids(&self) -> Vec<String> {
        self.inner.state.lock().await.queue.ids()
    }

    /// Queue length, processing count and a per-status tally.
    pub async fn queue_stats(&self) -> QueueStats {
        let st = self.inner.state.lock().await;
        let mut stats = QueueStats {
            queued: st.queue.len(),
            processing: st.processing.len(),
            total: st.tasks.len(),
            ..QueueStats::default()
        };
        for task in st.tasks.values() {
            *stats.by_status.entry(task.status.to_string()).or_insert(0) += 1;
        }
        stats
    }

    /// The latest snapshot of the workflow owned by `task_id`.
    pub fn get_workflow(&self, task_id: &str) -> Option<WorkflowExecution> {
        self.inner.workflows.read().get(task_id).cloned()
    }

    /// Cancel everything in flight, stop timers and drop all state.
    pub async fn shutdown(&self) {
        let mut st = self.inner.state.lock().await;
        for (_, handle) in st.workflow_runs.drain() {
            handle.abort();
        }
        let mut active: Vec<String> = st.processing.iter().cloned().collect();
        active.sort();
        for task_id in &active {
            self.cancel_locked(&mut st, task_id, "shutdown").await;
        }
        for (_, handle) in st.timers.drain() {
            handle.abort();
        }
        st.tasks.clear();
        st.queue.clear();
        st.processing.clear();
        st.last_handler = None;
        drop(st);
        self.inner.workflows.write().clear();
        info!(cancelled = active.len(), "Task manager shut down");
    }

    // --- State transitions (caller holds the state lock) ---

    async fn assign_locked(
        &self,
        st: &mut LifecycleState,
        task_id: &str,
    ) -> SwitchboardResult<Assignment> {
        let task = st
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| SwitchboardError::NotFound(format!("task {task_id}")))?;
        if !task.status.is_waiting() {
            return Err(SwitchboardError::invalid_transition(
                task_id,
                task.status,
                "assign",
            ));
        }
        match task.kind {
            TaskKind::Simple => self.assign_simple(st, task).await,
            TaskKind::MultiAgentWorkflow => self.start_workflow(st, task).await,
        }
    }

    async fn assign_simple(
        &self,
        st: &mut LifecycleState,
        task: Task,
    ) -> SwitchboardResult<Assignment> {
        let requirements = AgentRequirements::for_capabilities(&task.required_capabilities);
        let candidates = self
            .inner
            .registry
            .find_suitable_agents(&requirements)
            .await?;
        let agent_id = self.select_agent(st, &task, &candidates).ok_or_else(|| {
            SwitchboardError::NoSuitableAgent(format!(
                "no available agent offers [{}] for task {}",
                task.required_capabilities.join(", "),
                task.id
            ))
        })?;

        st.queue.remove(&task.id);
        let attempt = self.mark_assigned(st, &task.id, Some(agent_id.clone()));
        st.processing.insert(task.id.clone());
        self.inner.monitor.start_task(&agent_id).await;

        let payload = serde_json::json!({
            "task_id": task.id,
            "agent_id": agent_id,
            "priority": task.priority,
            "required_capabilities": task.required_capabilities,
            "input": task.input,
            "attempt": attempt,
        });
        if let Err(e) = self
            .inner
            .dispatcher
            .add_job(&self.inner.settings.queue_name, EXECUTE_TASK_JOB, payload)
            .await
        {
            let err = SwitchboardError::Dispatch(e.to_string());
            self.fail_locked(st, &task.id, &err).await;
            return Err(err);
        }

        let now = self.mark_in_progress(st, &task.id);
        self.arm_timeout(st, &task.id, attempt);

        info!(task_id = %task.id, agent_id = %agent_id, attempt, "Task assigned");
        self.inner.events.publish(OrchestrationEvent::TaskAssigned {
            task_id: task.id.clone(),
            agent_id: Some(agent_id.clone()),
            timestamp: now,
        });
        self.count("tasks_assigned_total", &[("job_type", EXECUTE_TASK_JOB)]);

        Ok(Assignment {
            task_id: task.id,
            agent_id: Some(agent_id),
            workflow_id: None,
        })
    }

    async fn start_workflow(
        &self,
        st: &mut LifecycleState,
        task: Task,
    ) -> SwitchboardResult<Assignment> {
        let mut execution = self.inner.executor.plan(&task).await?;
        let workflow_id = execution.id.clone();

        st.queue.remove(&task.id);
        let attempt = self.mark_assigned(st, &task.id, None);
        st.processing.insert(task.id.clone());
        let now = self.mark_in_progress(st, &task.id);
        self.inner
            .workflows
            .write()
            .insert(task.id.clone(), execution.clone());
        self.arm_timeout(st, &task.id, attempt);

        let manager = self.clone();
        let store = self.inner.workflows.clone();
        let task_id = task.id.clone();
        let handle = tokio::spawn(async move {
            let on_progress = move |e: &WorkflowExecution| {
                // Only the run that planned the stored execution may update it.
                if let Some(slot) = store.write().get_mut(&e.task_id).filter(|s| s.id == e.id) {
                    *slot = e.clone();
                }
            };
            let outcome = manager
                .inner
                .executor
                .run(&mut execution, &on_progress)
                .await
                .map(|outputs| {
                    serde_json::json!({
                        "workflow_id": execution.id,
                        "steps": outputs,
                    })
                });
            manager.finish_workflow(&task_id, attempt, outcome).await;
        });
        st.workflow_runs.insert(task.id.clone(), handle);

        info!(
            task_id = %task.id,
            workflow_id = %workflow_id,
            steps = task.required_capabilities.len(),
            "Workflow started"
        );
        self.inner.events.publish(OrchestrationEvent::TaskAssigned {
            task_id: task.id.clone(),
            agent_id: None,
            timestamp: now,
        });
        self.count("tasks_assigned_total", &[("job_type", "workflow")]);

        Ok(Assignment {
            task_id: task.id,
            agent_id: None,
            workflow_id: Some(workflow_id),
        })
    }

    async fn complete_locked(
        &self,
        st: &mut LifecycleState,
        task_id: &str,
        result: serde_json::Value,
    ) -> bool {
        let status = match st.tasks.get(task_id) {
            Some(t) => t.status,
            None => {
                warn!(task_id, "Completion for unknown task ignored");
                return false;
            }
        };
        if status == TaskStatus::Cancelled {
            debug!(task_id, "Completion for cancelled task ignored");
            return false;
        }
        if !status.is_active() {
            warn!(task_id, status = %status, "Completion for inactive task ignored");
            return false;
        }

        let now = self.inner.clock.now();
        let Some(task) = st.tasks.get_mut(task_id).map(|t| {
            t.status = TaskStatus::Completed;
            t.completed_at = Some(now);
            t.result = Some(result);
            t.clone()
        }) else {
            return false;
        };
        st.processing.remove(task_id);
        st.workflow_runs.remove(task_id);
        disarm_timeout(st, task_id);

        let duration_ms = elapsed_ms(task.started_at, now);
        if let Some(agent_id) = &task.assigned_agent_id {
            self.inner.monitor.record_success(agent_id, duration_ms).await;
            self.learn_outcome(st, &task, agent_id, None, now);
        }

        info!(
            task_id,
            agent_id = task.assigned_agent_id.as_deref().unwrap_or("-"),
            duration_ms,
            "Task completed"
        );
        self.inner.events.publish(OrchestrationEvent::TaskCompleted {
            task_id: task.id.clone(),
            agent_id: task.assigned_agent_id.clone(),
            duration_ms,
            timestamp: now,
        });
        self.count("tasks_completed_total", &[("job_type", kind_label(task.kind))]);
        true
    }

    async fn fail_locked(
        &self,
        st: &mut LifecycleState,
        task_id: &str,
        error: &SwitchboardError,
    ) -> bool {
        let status = match st.tasks.get(task_id) {
            Some(t) => t.status,
            None => {
                warn!(task_id, "Failure for unknown task ignored");
                return false;
            }
        };
        if matches!(
            status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        ) {
            debug!(task_id, status = %status, "Failure for finished task ignored");
            return false;
        }

        let now = self.inner.clock.now();
        let Some(task) = st.tasks.get_mut(task_id).map(|t| {
            t.status = TaskStatus::Failed;
            t.completed_at = Some(now);
            t.error = Some(TaskError::from_error(error, now));
            t.clone()
        }) else {
            return false;
        };
        st.queue.remove(task_id);
        st.processing.remove(task_id);
        st.workflow_runs.remove(task_id);
        disarm_timeout(st, task_id);

        if status.is_active() {
            if let Some(agent_id) = &task.assigned_agent_id {
                self.inner.monitor.record_failure(agent_id).await;
                self.learn_outcome(st, &task, agent_id, Some(error), now);
            }
        }

        warn!(task_id, code = error.code(), error = %error, "Task failed");
        self.inner.events.publish(OrchestrationEvent::TaskFailed {
            task_id: task_id.to_string(),
            code: error.code().to_string(),
            message: error.to_string(),
            timestamp: now,
        });
        self.count("tasks_failed_total", &[("code", error.code())]);
        true
    }

    async fn cancel_locked(&self, st: &mut LifecycleState, task_id: &str, reason: &str) {
        let now = self.inner.clock.now();
        let Some((previous, agent_id)) = st.tasks.get_mut(task_id).map(|t| {
            let previous = t.status;
            t.status = TaskStatus::Cancelled;
            t.completed_at = Some(now);
            (previous, t.assigned_agent_id.clone())
        }) else {
            return;
        };
        let was_queued = st.queue.remove(task_id);
        st.processing.remove(task_id);
        st.workflow_runs.remove(task_id);
        disarm_timeout(st, task_id);

        if previous.is_active() {
            if let Some(agent_id) = &agent_id {
                self.inner.monitor.release(agent_id).await;
            }
        }

        info!(task_id, reason, was_queued, "Task cancelled");
        self.inner.events.publish(OrchestrationEvent::TaskCancelled {
            task_id: task_id.to_string(),
            reason: reason.to_string(),
            timestamp: now,
        });
        self.count("tasks_cancelled_total", &[]);
    }

    async fn finish_workflow(
        &self,
        task_id: &str,
        attempt: u32,
        outcome: SwitchboardResult<serde_json::Value>,
    ) -> bool {
        let mut st = self.inner.state.lock().await;
        if superseded(&st, task_id, attempt) {
            return false;
        }
        // The finishing run is this task; forget it instead of aborting it.
        st.workflow_runs.remove(task_id);
        match outcome {
            Ok(result) => self.complete_locked(&mut st, task_id, result).await,
            Err(e) => self.fail_locked(&mut st, task_id, &e).await,
        }
    }

    async fn handle_timeout(&self, task_id: &str, attempt: u32) {
        let mut st = self.inner.state.lock().await;
        let current = st
            .tasks
            .get(task_id)
            .is_some_and(|t| t.attempt == attempt && t.status.is_active());
        if !current {
            return;
        }
        // The running timer is this task; forget it instead of aborting it.
        st.timers.remove(task_id);
        let err = SwitchboardError::TaskTimeout(format!(
            "task {task_id} exceeded {}s",
            self.inner.settings.task_timeout.as_secs()
        ));
        self.fail_locked(&mut st, task_id, &err).await;
    }

    fn arm_timeout(&self, st: &mut LifecycleState, task_id: &str, attempt: u32) {
        let manager = self.clone();
        let id = task_id.to_string();
        let timeout = self.inner.settings.task_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            manager.handle_timeout(&id, attempt).await;
        });
        if let Some(stale) = st.timers.insert(task_id.to_string(), handle) {
            stale.abort();
        }
    }

    fn mark_assigned(&self, st: &mut LifecycleState, task_id: &str, agent_id: Option<String>) -> u32 {
        st.tasks.get_mut(task_id).map_or(0, |t| {
            t.status = TaskStatus::Assigned;
            t.assigned_agent_id = agent_id;
            t.attempt += 1;
            t.attempt
        })
    }

    fn mark_in_progress(&self, st: &mut LifecycleState, task_id: &str) -> DateTime<Utc> {
        let now = self.inner.clock.now();
        if let Some(t) = st.tasks.get_mut(task_id) {
            t.status = TaskStatus::InProgress;
            t.started_at = Some(now);
        }
        now
    }

    // --- Agent selection and learning ---

    fn select_agent(
        &self,
        st: &LifecycleState,
        task: &Task,
        candidates: &[AgentCandidate],
    ) -> Option<String> {
        if let Some((rule, chosen)) = apply_rules(&self.inner.settings.strategy, task, candidates) {
            debug!(task_id = %task.id, rule = %rule.name, agent_id = %chosen.agent.id, "Strategy rule applied");
            return Some(chosen.agent.id.clone());
        }

        if self.inner.settings.use_predictions {
            let request = switch_request(
                st.last_handler.as_deref(),
                task,
                self.inner.clock.now(),
                SwitchReason::LoadBalancing,
            );
            if let Some(prediction) = self.inner.learner.predict(&request) {
                if candidates
                    .iter()
                    .any(|c| c.agent.id == prediction.suggested_agent_id)
                {
                    debug!(
                        task_id = %task.id,
                        agent_id = %prediction.suggested_agent_id,
                        confidence = prediction.confidence,
                        "Prediction applied"
                    );
                    return Some(prediction.suggested_agent_id);
                }
            }
        }

        candidates.first().map(|c| c.agent.id.clone())
    }

    /// Feed a finished simple task to the learner as a handler switch.
    fn learn_outcome(
        &self,
        st: &mut LifecycleState,
        task: &Task,
        agent_id: &str,
        error: Option<&SwitchboardError>,
        now: DateTime<Utc>,
    ) {
        let success = error.is_none();
        let reason = match error {
            Some(SwitchboardError::TaskTimeout(_)) => SwitchReason::Timeout,
            _ if task.retries > 0 => SwitchReason::PerformanceDegradation,
            _ => SwitchReason::LoadBalancing,
        };
        let started = task.started_at.unwrap_or(now);
        let request = switch_request(st.last_handler.as_deref(), task, started, reason);
        let mut result = SwitchResult::new(&request, success, now)
            .to_agent(agent_id)
            .with_duration(elapsed_ms(Some(started), now));
        result.metrics.handoff_latency_ms = elapsed_ms(Some(task.created_at), started);

        let summary = self.inner.learner.learn_from_result(result, request);
        debug!(
            task_id = %task.id,
            updated = summary.updated_patterns.len(),
            learned = summary.new_patterns.len(),
            insights = summary.insights.len(),
            "Learned from task outcome"
        );
        self.count(
            "agent_switches_total",
            &[
                ("reason", reason.to_string().as_str()),
                ("status", if success { "success" } else { "failure" }),
            ],
        );
        st.last_handler = Some(agent_id.to_string());
    }

    fn count(&self, name: &str, labels: &[(&str, &str)]) {
        let mut all: Vec<(&str, &str)> = Vec::with_capacity(labels.len() + 1);
        all.push(("queue", self.inner.settings.queue_name.as_str()));
        all.extend_from_slice(labels);
        self.inner.metrics.increment(name, &all);
    }
}

/// Whether `attempt` belongs to an assignment the task has since moved past.
fn superseded(st: &LifecycleState, task_id: &str, attempt: u32) -> bool {
    match st.tasks.get(task_id) {
        Some(task) if task.attempt != attempt => {
            debug!(
                task_id,
                attempt,
                current = task.attempt,
                "Callback from an earlier attempt ignored"
            );
            true
        }
        _ => false,
    }
}

fn disarm_timeout(st: &mut LifecycleState, task_id: &str) {
    if let Some(handle) = st.timers.remove(task_id) {
        handle.abort();
    }
}

fn elapsed_ms(from: Option<DateTime<Utc>>, to: DateTime<Utc>) -> u64 {
    from.map_or(0, |f| (to - f).num_milliseconds().max(0) as u64)
}

fn kind_label(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Simple => EXECUTE_TASK_JOB,
        TaskKind::MultiAgentWorkflow => "workflow",
    }
}

/// Switch urgency derived from task priority.
pub fn urgency_for(priority: Priority) -> Urgency {
    match priority {
        Priority::Critical => Urgency::Critical,
        Priority::Urgent | Priority::High => Urgency::High,
        Priority::Medium => Urgency::Medium,
        Priority::Low => Urgency::Low,
    }
}

fn switch_request(
    from: Option<&str>,
    task: &Task,
    at: DateTime<Utc>,
    reason: SwitchReason,
) -> SwitchRequest {
    let request = SwitchRequest::new(reason, urgency_for(task.priority), at)
        .for_task(task.id.clone())
        .with_target(TargetCriteria {
            required_capabilities: task.required_capabilities.clone(),
            ..TargetCriteria::default()
        });
    match from {
        Some(agent_id) => request.from_agent(agent_id),
        None => request,
    }
}
