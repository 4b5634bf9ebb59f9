use crate::condition::match_score;
use crate::config::LearningConfig;
use crate::detection::{default_detectors, DetectionContext, PatternDetector};
use crate::history::SwitchHistory;
use crate::insights::{self, InsightLog, TOP_INSIGHTS};
use crate::prediction;
use crate::types::{
    LearningInsight, LearningStats, PredictionResult, SwitchPattern, SwitchRecord, SwitchRequest,
    SwitchResult,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use switchboard_core::{Clock, EventBus, OrchestrationEvent};
use tracing::{debug, info};

/// Minimum match score for a pattern to absorb a new observation.
pub const LEARNING_MATCH_THRESHOLD: f64 = 0.8;
const SUCCESS_SAMPLE: f64 = 1.0;
const FAILURE_SAMPLE: f64 = 0.5;

/// Exponential smoothing step: `old·(1-α) + sample·α`, clamped to [0,1].
pub fn smooth(old: f64, sample: f64, alpha: f64) -> f64 {
    (old * (1.0 - alpha) + sample * alpha).clamp(0.0, 1.0)
}

fn outcome_sample(success: bool) -> f64 {
    if success {
        SUCCESS_SAMPLE
    } else {
        FAILURE_SAMPLE
    }
}

/// What one `learn_from_result` call changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearningSummary {
    /// Existing patterns that matched the request and were updated.
    pub updated_patterns: Vec<String>,
    /// Patterns persisted for the first time by detection.
    pub new_patterns: Vec<String>,
    pub insights: Vec<LearningInsight>,
}

/// What one optimization pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationReport {
    pub removed: usize,
    pub detected: usize,
    pub remaining: usize,
}

struct LearnerState {
    history: SwitchHistory,
    patterns: HashMap<String, SwitchPattern>,
    insights: InsightLog,
}

/// Learns switch patterns from outcomes and predicts future targets.
///
/// All state lives behind one lock so that a history append and the pattern
/// updates it triggers are observed together by other callers.
pub struct SwitchPatternLearner {
    config: LearningConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
    detectors: Vec<Box<dyn PatternDetector>>,
    state: Mutex<LearnerState>,
}

impl SwitchPatternLearner {
    pub fn new(config: LearningConfig, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        let state = LearnerState {
            history: SwitchHistory::new(config.history_capacity),
            patterns: HashMap::new(),
            insights: InsightLog::new(config.insight_capacity),
        };
        Self {
            config,
            clock,
            events,
            detectors: default_detectors(),
            state: Mutex::new(state),
        }
    }

    /// Replace the detector set.
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn PatternDetector>>) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Record a switch outcome, update matching patterns, detect new ones and
    /// derive insights.
    pub fn learn_from_result(&self, result: SwitchResult, request: SwitchRequest) -> LearningSummary {
        let now = self.clock.now();
        let mut summary = LearningSummary::default();

        let (total, recent) = {
            let mut state = self.state.lock();
            let success = result.success;
            let context = request.match_context();
            state.history.push(SwitchRecord { request, result });

            let alpha = self.config.learning_rate;
            for pattern in state.patterns.values_mut() {
                if match_score(&pattern.conditions, &context) < LEARNING_MATCH_THRESHOLD {
                    continue;
                }
                pattern.frequency += 1;
                pattern.last_observed = now;
                let n = pattern.frequency as f64;
                let observed = if success { 1.0 } else { 0.0 };
                pattern.success_rate = (pattern.success_rate * (n - 1.0) + observed) / n;
                pattern.confidence = smooth(pattern.confidence, outcome_sample(success), alpha);
                summary.updated_patterns.push(pattern.id.clone());
            }

            summary.new_patterns = self.detect_into(&mut state, now);

            for insight in insights::analyze(&state.history, self.config.insight_window, now) {
                state.insights.push(insight.clone());
                summary.insights.push(insight);
            }

            let total = state.patterns.len();
            let recent = Self::recent_count(&state.patterns, now);
            (total, recent)
        };

        debug!(
            updated = summary.updated_patterns.len(),
            new = summary.new_patterns.len(),
            total_patterns = total,
            "Learned from switch result"
        );

        for insight in &summary.insights {
            info!(title = %insight.title, priority = %insight.priority, "Insight generated");
            self.events.publish(OrchestrationEvent::InsightGenerated {
                title: insight.title.clone(),
                kind: insight.kind.to_string(),
                priority: insight.priority.to_string(),
                timestamp: now,
            });
        }
        self.events.publish(OrchestrationEvent::PatternLearned {
            total_patterns: total,
            recent_patterns: recent,
            timestamp: now,
        });

        summary
    }

    /// Run all detectors over the recent history and merge their candidates.
    ///
    /// Known patterns keep their confidence; their frequency, outcomes and last
    /// observation are refreshed from the candidate. New candidates are kept
    /// only when frequent and confident enough.
    fn detect_into(&self, state: &mut LearnerState, now: DateTime<Utc>) -> Vec<String> {
        let ctx = DetectionContext {
            minimum_occurrences: self.config.minimum_occurrences,
            now,
        };
        let candidates: Vec<SwitchPattern> = {
            let records = state.history.recent(self.config.detection_window);
            self.detectors
                .iter()
                .flat_map(|d| d.detect(&records, &ctx))
                .collect()
        };

        let mut added = Vec::new();
        for candidate in candidates {
            match state.patterns.get_mut(&candidate.id) {
                Some(existing) => {
                    existing.frequency = existing.frequency.max(candidate.frequency);
                    existing.outcomes = candidate.outcomes;
                    existing.last_observed = existing.last_observed.max(candidate.last_observed);
                }
                None => {
                    if candidate.frequency >= self.config.minimum_occurrences
                        && candidate.confidence >= self.config.confidence_threshold
                    {
                        info!(
                            pattern = %candidate.id,
                            confidence = candidate.confidence,
                            frequency = candidate.frequency,
                            "New switch pattern learned"
                        );
                        added.push(candidate.id.clone());
                        state.patterns.insert(candidate.id.clone(), candidate);
                    }
                }
            }
        }

        Self::enforce_capacity(&mut state.patterns, self.config.max_patterns);
        added
    }

    /// Evict the least recently observed patterns beyond `max`.
    fn enforce_capacity(patterns: &mut HashMap<String, SwitchPattern>, max: usize) {
        if patterns.len() <= max {
            return;
        }
        let mut by_age: Vec<(DateTime<Utc>, String)> = patterns
            .values()
            .map(|p| (p.last_observed, p.id.clone()))
            .collect();
        by_age.sort();
        let excess = patterns.len() - max;
        for (_, id) in by_age.into_iter().take(excess) {
            debug!(pattern = %id, "Evicting pattern over capacity");
            patterns.remove(&id);
        }
    }

    fn recent_count(patterns: &HashMap<String, SwitchPattern>, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::hours(1);
        patterns
            .values()
            .filter(|p| p.last_observed >= cutoff)
            .count()
    }

    /// Hourly maintenance: purge stale or weak patterns, re-detect, and
    /// re-blend surviving confidences against the most recent history.
    pub fn optimize(&self) -> OptimizationReport {
        let now = self.clock.now();
        let retention_cutoff = now - Duration::days(self.config.pattern_retention_days);
        let threshold = self.config.confidence_threshold;
        let alpha = self.config.learning_rate;

        let report = {
            let mut state = self.state.lock();
            let before = state.patterns.len();
            state
                .patterns
                .retain(|_, p| p.last_observed >= retention_cutoff && p.confidence >= threshold);
            let removed = before - state.patterns.len();

            let detected = self.detect_into(&mut state, now).len();

            let LearnerState {
                history, patterns, ..
            } = &mut *state;
            let contexts: Vec<(serde_json::Value, bool)> = history
                .recent(self.config.reblend_window)
                .iter()
                .map(|r| (r.request.match_context(), r.result.success))
                .collect();
            for pattern in patterns.values_mut() {
                let samples: Vec<f64> = contexts
                    .iter()
                    .filter(|(ctx, _)| {
                        match_score(&pattern.conditions, ctx) >= LEARNING_MATCH_THRESHOLD
                    })
                    .map(|(_, success)| outcome_sample(*success))
                    .collect();
                if samples.is_empty() {
                    continue;
                }
                let observed = samples.iter().sum::<f64>() / samples.len() as f64;
                pattern.confidence = smooth(pattern.confidence, observed, alpha);
            }

            OptimizationReport {
                removed,
                detected,
                remaining: patterns.len(),
            }
        };

        info!(
            removed = report.removed,
            detected = report.detected,
            remaining = report.remaining,
            "Switch patterns optimized"
        );
        self.events.publish(OrchestrationEvent::PatternsOptimized {
            removed: report.removed,
            remaining: report.remaining,
            timestamp: now,
        });
        report
    }

    /// Daily maintenance: drop insights older than the retention period.
    pub fn prune_insights(&self) -> usize {
        let cutoff = self.clock.now() - Duration::days(self.config.insight_retention_days);
        let removed = self.state.lock().insights.prune_before(cutoff);
        if removed > 0 {
            info!(removed, "Pruned old insights");
        }
        removed
    }

    /// Suggest a target agent for `request`, or `None` when predictive
    /// analysis is disabled or no pattern matches.
    pub fn predict(&self, request: &SwitchRequest) -> Option<PredictionResult> {
        if !self.config.predictive_analysis {
            return None;
        }
        let now = self.clock.now();
        let state = self.state.lock();
        prediction::predict(state.patterns.values(), request, now)
    }

    /// Insert or replace a pattern, e.g. when seeding from a previous run.
    pub fn upsert_pattern(&self, mut pattern: SwitchPattern) {
        pattern.confidence = pattern.confidence.clamp(0.0, 1.0);
        let mut state = self.state.lock();
        state.patterns.insert(pattern.id.clone(), pattern);
        Self::enforce_capacity(&mut state.patterns, self.config.max_patterns);
    }

    /// All patterns, most confident first.
    pub fn patterns(&self) -> Vec<SwitchPattern> {
        let mut patterns: Vec<SwitchPattern> =
            self.state.lock().patterns.values().cloned().collect();
        patterns.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.id.cmp(&b.id))
        });
        patterns
    }

    pub fn pattern(&self, id: &str) -> Option<SwitchPattern> {
        self.state.lock().patterns.get(id).cloned()
    }

    /// The top insights by priority then confidence.
    pub fn insights(&self) -> Vec<LearningInsight> {
        self.state.lock().insights.top(TOP_INSIGHTS)
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn stats(&self) -> LearningStats {
        let now = self.clock.now();
        let state = self.state.lock();
        let mut patterns_by_type: HashMap<String, usize> = HashMap::new();
        for p in state.patterns.values() {
            *patterns_by_type.entry(p.pattern_type.to_string()).or_insert(0) += 1;
        }
        let average_confidence = if state.patterns.is_empty() {
            0.0
        } else {
            state.patterns.values().map(|p| p.confidence).sum::<f64>()
                / state.patterns.len() as f64
        };

        LearningStats {
            total_patterns: state.patterns.len(),
            patterns_by_type,
            average_confidence,
            history_size: state.history.len(),
            overall_success_rate: state
                .history
                .success_rate(state.history.capacity())
                .unwrap_or(0.0),
            recent_success_rate: state
                .history
                .success_rate(self.config.insight_window)
                .unwrap_or(0.0),
            recent_patterns: Self::recent_count(&state.patterns, now),
            insight_count: state.insights.len(),
        }
    }

    /// Forget everything. Used on shutdown.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.patterns.clear();
        state.insights.clear();
    }
}
