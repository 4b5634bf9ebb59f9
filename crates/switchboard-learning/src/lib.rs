//! Adaptive switching: learns from past agent-switch outcomes and predicts
//! which agent should take over a future request.
//!
//! # Main types
//!
//! - [`SwitchPatternLearner`] — Owns the switch history, pattern map and insights.
//! - [`SwitchPattern`] — A learned condition → outcome association.
//! - [`PredictionResult`] — Weighted target suggestion with reasoning and risks.
//! - [`LearningInsight`] — Human-readable observation about switch health.
//! - [`LearningConfig`] — Learning rate, thresholds and capacities.

/// Condition evaluation over request JSON.
pub mod condition;
/// Learner configuration.
pub mod config;
/// Pattern detectors.
pub mod detection;
/// Bounded switch history.
pub mod history;
/// Insight generation and storage.
pub mod insights;
/// The switch pattern learner.
pub mod learner;
/// Weighted prediction from matching patterns.
pub mod prediction;
/// Switch, pattern and insight types.
pub mod types;

pub use config::LearningConfig;
pub use detection::{PatternDetector, SequentialDetector, TimeBasedDetector};
pub use learner::{LearningSummary, OptimizationReport, SwitchPatternLearner};
pub use types::{
    ConditionOperator, ConditionValue, ContextPreservation, InsightKind, InsightPriority,
    LearningInsight, LearningStats, PatternCondition, PatternOutcome, PatternType,
    PredictionResult, SwitchMetrics, SwitchPattern, SwitchReason, SwitchRecord, SwitchRequest,
    SwitchResult, TargetCriteria, Urgency, WorkloadPreference,
};
