use serde::{Deserialize, Serialize};
use switchboard_core::{SwitchboardError, SwitchboardResult};

/// Tuning knobs for the switch pattern learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Smoothing factor α for confidence updates.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_minimum_occurrences")]
    pub minimum_occurrences: u64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_pattern_retention_days")]
    pub pattern_retention_days: i64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Number of recent history records scanned by pattern detection.
    #[serde(default = "default_detection_window")]
    pub detection_window: usize,
    /// Number of recent history records used to re-blend confidence.
    #[serde(default = "default_reblend_window")]
    pub reblend_window: usize,
    #[serde(default = "default_max_patterns")]
    pub max_patterns: usize,
    #[serde(default = "default_insight_capacity")]
    pub insight_capacity: usize,
    #[serde(default = "default_insight_retention_days")]
    pub insight_retention_days: i64,
    /// Number of recent history records the insight generator looks at.
    #[serde(default = "default_insight_window")]
    pub insight_window: usize,
    #[serde(default = "default_true")]
    pub predictive_analysis: bool,
}

fn default_learning_rate() -> f64 {
    0.1
}
fn default_minimum_occurrences() -> u64 {
    5
}
fn default_confidence_threshold() -> f64 {
    0.7
}
fn default_pattern_retention_days() -> i64 {
    30
}
fn default_history_capacity() -> usize {
    10_000
}
fn default_detection_window() -> usize {
    1_000
}
fn default_reblend_window() -> usize {
    100
}
fn default_max_patterns() -> usize {
    1_000
}
fn default_insight_capacity() -> usize {
    1_000
}
fn default_insight_retention_days() -> i64 {
    7
}
fn default_insight_window() -> usize {
    100
}
fn default_true() -> bool {
    true
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            minimum_occurrences: default_minimum_occurrences(),
            confidence_threshold: default_confidence_threshold(),
            pattern_retention_days: default_pattern_retention_days(),
            history_capacity: default_history_capacity(),
            detection_window: default_detection_window(),
            reblend_window: default_reblend_window(),
            max_patterns: default_max_patterns(),
            insight_capacity: default_insight_capacity(),
            insight_retention_days: default_insight_retention_days(),
            insight_window: default_insight_window(),
            predictive_analysis: true,
        }
    }
}

impl LearningConfig {
    /// Reject values the learner cannot work with.
    pub fn validate(&self) -> SwitchboardResult<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(SwitchboardError::Config(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(SwitchboardError::Config(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.minimum_occurrences == 0 {
            return Err(SwitchboardError::Config(
                "minimum_occurrences must be at least 1".into(),
            ));
        }
        if self.pattern_retention_days <= 0 || self.insight_retention_days <= 0 {
            return Err(SwitchboardError::Config(
                "retention periods must be positive".into(),
            ));
        }
        for (name, value) in [
            ("history_capacity", self.history_capacity),
            ("detection_window", self.detection_window),
            ("reblend_window", self.reblend_window),
            ("max_patterns", self.max_patterns),
            ("insight_capacity", self.insight_capacity),
            ("insight_window", self.insight_window),
        ] {
            if value == 0 {
                return Err(SwitchboardError::Config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}
