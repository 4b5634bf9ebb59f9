use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Observable side effects emitted by the scheduler and the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    /// A task passed validation and entered the queue.
    TaskSubmitted {
        task_id: String,
        priority: String,
        timestamp: DateTime<Utc>,
    },
    /// A task was handed to an agent.
    TaskAssigned {
        task_id: String,
        /// `None` for multi-agent workflows, which run one agent per step.
        agent_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A task finished successfully.
    TaskCompleted {
        task_id: String,
        agent_id: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A task failed (including timeouts).
    TaskFailed {
        task_id: String,
        code: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// A task was cancelled by the caller or by shutdown.
    TaskCancelled {
        task_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A failed task was reset and put back on the queue.
    TaskRetried {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
    /// The learner absorbed a switch result.
    PatternLearned {
        total_patterns: usize,
        /// Patterns observed within the last hour.
        recent_patterns: usize,
        timestamp: DateTime<Utc>,
    },
    /// The periodic optimization pass finished.
    PatternsOptimized {
        removed: usize,
        remaining: usize,
        timestamp: DateTime<Utc>,
    },
    /// A new insight was derived from the switch history.
    InsightGenerated {
        title: String,
        kind: String,
        priority: String,
        timestamp: DateTime<Utc>,
    },
}

impl OrchestrationEvent {
    /// Topic name, e.g. `task:submitted`.
    pub fn name(&self) -> &'static str {
        match self {
            OrchestrationEvent::TaskSubmitted { .. } => "task:submitted",
            OrchestrationEvent::TaskAssigned { .. } => "task:assigned",
            OrchestrationEvent::TaskCompleted { .. } => "task:completed",
            OrchestrationEvent::TaskFailed { .. } => "task:failed",
            OrchestrationEvent::TaskCancelled { .. } => "task:cancelled",
            OrchestrationEvent::TaskRetried { .. } => "task:retried",
            OrchestrationEvent::PatternLearned { .. } => "pattern:learned",
            OrchestrationEvent::PatternsOptimized { .. } => "patterns:optimized",
            OrchestrationEvent::InsightGenerated { .. } => "insight:generated",
        }
    }
}

/// In-process publish/subscribe bus.
///
/// Every subscriber receives every event published after it subscribed.
/// Publishing with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OrchestrationEvent>,
}

impl EventBus {
    /// Create a bus whose subscribers may lag by at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: OrchestrationEvent) {
        trace!(event = event.name(), "publish");
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(OrchestrationEvent::TaskRetried {
            task_id: "t1".into(),
            timestamp: Utc::now(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "task:retried");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(OrchestrationEvent::PatternsOptimized {
            removed: 0,
            remaining: 0,
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = OrchestrationEvent::TaskCancelled {
            task_id: "t9".into(),
            reason: "user".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "task_cancelled");
        assert_eq!(json["task_id"], "t9");
    }
}
