use crate::scheduler::{default_maintenance, ScheduledJob, Scheduler};
use crate::strategy::StrategyRule;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use switchboard_core::{SwitchboardError, SwitchboardResult};
use switchboard_learning::LearningConfig;

/// Scheduler, lifecycle and learner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Dispatcher queue that receives `execute_task` jobs.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    /// Interval between queue ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// How long a task may stay in progress before it is failed.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Delay of the simulated workflow step runner.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Let learned patterns bias agent selection.
    #[serde(default = "default_true")]
    pub use_predictions: bool,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub strategy: Vec<StrategyRule>,
    #[serde(default = "default_maintenance")]
    pub maintenance: Vec<ScheduledJob>,
    #[serde(default)]
    pub learning: LearningConfig,
}

fn default_queue_name() -> String {
    "agent-tasks".into()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_task_timeout_secs() -> u64 {
    300
}

fn default_step_delay_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            tick_interval_ms: default_tick_interval_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            step_delay_ms: default_step_delay_ms(),
            use_predictions: true,
            event_capacity: default_event_capacity(),
            strategy: Vec::new(),
            maintenance: default_maintenance(),
            learning: LearningConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> SwitchboardResult<Self> {
        let config: Self = toml::from_str(s)
            .map_err(|e| SwitchboardError::Config(format!("invalid orchestrator config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> SwitchboardResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> SwitchboardResult<()> {
        if self.queue_name.trim().is_empty() {
            return Err(SwitchboardError::Config("queue_name must not be empty".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(SwitchboardError::Config("tick_interval_ms must be > 0".into()));
        }
        if self.task_timeout_secs == 0 {
            return Err(SwitchboardError::Config("task_timeout_secs must be > 0".into()));
        }
        if self.event_capacity == 0 {
            return Err(SwitchboardError::Config("event_capacity must be > 0".into()));
        }
        Scheduler::new(self.maintenance.clone()).validate()?;
        self.learning.validate()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}
