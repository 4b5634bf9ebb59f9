use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use switchboard_core::{SwitchboardError, SwitchboardResult};
use tokio::sync::mpsc;
use tracing::debug;

/// Job type used for single-agent task execution.
pub const EXECUTE_TASK_JOB: &str = "execute_task";

/// Hands work to the agents' job queue.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn add_job(
        &self,
        queue: &str,
        job_type: &str,
        payload: serde_json::Value,
    ) -> SwitchboardResult<()>;
}

/// A job as it was handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchedJob {
    pub queue: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub dispatched_at: DateTime<Utc>,
}

impl DispatchedJob {
    /// The `task_id` field of the payload, if present.
    pub fn task_id(&self) -> Option<&str> {
        self.payload.get("task_id").and_then(|v| v.as_str())
    }

    /// The `agent_id` field of the payload, if present.
    pub fn agent_id(&self) -> Option<&str> {
        self.payload.get("agent_id").and_then(|v| v.as_str())
    }

    /// The assignment attempt the job was dispatched for.
    pub fn attempt(&self) -> Option<u32> {
        self.payload
            .get("attempt")
            .and_then(|v| v.as_u64())
            .and_then(|n| u32::try_from(n).ok())
    }
}

/// Records every job and optionally forwards it to a worker channel.
#[derive(Debug, Default)]
pub struct InMemoryDispatcher {
    jobs: Mutex<Vec<DispatchedJob>>,
    tx: Option<mpsc::UnboundedSender<DispatchedJob>>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher whose jobs are also delivered to the returned receiver.
    pub fn with_channel() -> (Self, mpsc::UnboundedReceiver<DispatchedJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                jobs: Mutex::new(Vec::new()),
                tx: Some(tx),
            },
            rx,
        )
    }

    /// Every job dispatched so far, oldest first.
    pub fn jobs(&self) -> Vec<DispatchedJob> {
        self.jobs.lock().clone()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }
}

#[async_trait]
impl JobDispatcher for InMemoryDispatcher {
    async fn add_job(
        &self,
        queue: &str,
        job_type: &str,
        payload: serde_json::Value,
    ) -> SwitchboardResult<()> {
        let job = DispatchedJob {
            queue: queue.to_string(),
            job_type: job_type.to_string(),
            payload,
            dispatched_at: Utc::now(),
        };
        debug!(queue, job_type, "Job dispatched");
        self.jobs.lock().push(job.clone());
        if let Some(tx) = &self.tx {
            tx.send(job)
                .map_err(|_| SwitchboardError::Dispatch("worker channel closed".into()))?;
        }
        Ok(())
    }
}
