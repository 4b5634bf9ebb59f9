use crate::history::SwitchHistory;
use crate::types::{InsightKind, InsightPriority, LearningInsight};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use uuid::Uuid;

/// Success rate below which a warning is raised.
const SUCCESS_RATE_FLOOR: f64 = 0.8;
/// Average switch duration above which an optimization hint is raised.
const SLOW_HANDOFF_MS: f64 = 10_000.0;
/// How many insights a read returns.
pub const TOP_INSIGHTS: usize = 20;

/// Bounded, append-only insight store.
#[derive(Debug, Clone)]
pub struct InsightLog {
    entries: VecDeque<LearningInsight>,
    capacity: usize,
}

impl InsightLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, insight: LearningInsight) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(insight);
    }

    /// Drop insights discovered before `cutoff`. Returns how many were removed.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|i| i.discovered_at >= cutoff);
        before - self.entries.len()
    }

    /// Highest-priority insights first, then by confidence, at most `limit`.
    pub fn top(&self, limit: usize) -> Vec<LearningInsight> {
        let mut sorted: Vec<LearningInsight> = self.entries.iter().cloned().collect();
        sorted.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| b.confidence.total_cmp(&a.confidence))
        });
        sorted.truncate(limit);
        sorted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Derive insights from the last `window` history records.
pub fn analyze(history: &SwitchHistory, window: usize, now: DateTime<Utc>) -> Vec<LearningInsight> {
    let mut insights = Vec::new();
    let sample = history.recent(window).len();
    if sample == 0 {
        return insights;
    }
    // Fuller windows give more trustworthy readings.
    let confidence = (sample as f64 / window.max(1) as f64).clamp(0.1, 1.0);

    if let Some(rate) = history.success_rate(window) {
        if rate < SUCCESS_RATE_FLOOR {
            insights.push(LearningInsight {
                id: Uuid::new_v4().to_string(),
                kind: InsightKind::Warning,
                priority: InsightPriority::High,
                title: "Declining Success Rate".to_string(),
                description: format!(
                    "Agent switch success rate is {:.1}% over the last {sample} switches",
                    rate * 100.0
                ),
                actionable: true,
                suggested_actions: vec![
                    "Review agent capability assignments".to_string(),
                    "Check agent health and availability".to_string(),
                    "Raise the minimum success rate required for switch targets".to_string(),
                ],
                confidence,
                data: serde_json::json!({ "success_rate": rate, "sample_size": sample }),
                discovered_at: now,
            });
        }
    }

    if let Some(avg) = history.average_duration_ms(window) {
        if avg > SLOW_HANDOFF_MS {
            insights.push(LearningInsight {
                id: Uuid::new_v4().to_string(),
                kind: InsightKind::Optimization,
                priority: InsightPriority::Medium,
                title: "Slow Switch Handoff".to_string(),
                description: format!(
                    "Average switch duration is {avg:.0}ms over the last {sample} switches"
                ),
                actionable: true,
                suggested_actions: vec![
                    "Reduce the amount of context preserved across switches".to_string(),
                    "Pre-warm frequently targeted agents".to_string(),
                ],
                confidence,
                data: serde_json::json!({ "average_duration_ms": avg, "sample_size": sample }),
                discovered_at: now,
            });
        }
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SwitchReason, SwitchRecord, SwitchRequest, SwitchResult, Urgency};
    use chrono::Duration;

    fn insight(priority: InsightPriority, confidence: f64, at: DateTime<Utc>) -> LearningInsight {
        LearningInsight {
            id: Uuid::new_v4().to_string(),
            kind: InsightKind::Trend,
            priority,
            title: format!("{priority}-{confidence}"),
            description: String::new(),
            actionable: false,
            suggested_actions: Vec::new(),
            confidence,
            data: serde_json::Value::Null,
            discovered_at: at,
        }
    }

    fn history_of(outcomes: &[(bool, u64)]) -> SwitchHistory {
        let mut history = SwitchHistory::new(1000);
        for (success, duration) in outcomes {
            let request = SwitchRequest::new(SwitchReason::Timeout, Urgency::Low, Utc::now());
            let result = SwitchResult::new(&request, *success, Utc::now()).with_duration(*duration);
            history.push(SwitchRecord { request, result });
        }
        history
    }

    #[test]
    fn test_top_sorted_by_priority_then_confidence() {
        let now = Utc::now();
        let mut log = InsightLog::new(10);
        log.push(insight(InsightPriority::Low, 0.99, now));
        log.push(insight(InsightPriority::High, 0.5, now));
        log.push(insight(InsightPriority::Critical, 0.1, now));
        log.push(insight(InsightPriority::High, 0.9, now));

        let top = log.top(3);
        let order: Vec<(InsightPriority, f64)> =
            top.iter().map(|i| (i.priority, i.confidence)).collect();
        assert_eq!(
            order,
            vec![
                (InsightPriority::Critical, 0.1),
                (InsightPriority::High, 0.9),
                (InsightPriority::High, 0.5),
            ]
        );
    }

    #[test]
    fn test_capacity_and_pruning() {
        let now = Utc::now();
        let mut log = InsightLog::new(2);
        log.push(insight(InsightPriority::Low, 0.1, now - Duration::days(10)));
        log.push(insight(InsightPriority::Low, 0.2, now - Duration::days(8)));
        log.push(insight(InsightPriority::Low, 0.3, now));
        assert_eq!(log.len(), 2);

        let removed = log.prune_before(now - Duration::days(7));
        assert_eq!(removed, 1);
        assert_eq!(log.top(10)[0].confidence, 0.3);
    }

    #[test]
    fn test_declining_success_rate_warning() {
        let history = history_of(&[(true, 100), (false, 100), (false, 100), (true, 100)]);
        let insights = analyze(&history, 100, Utc::now());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Declining Success Rate");
        assert_eq!(insights[0].kind, InsightKind::Warning);
        assert_eq!(insights[0].priority, InsightPriority::High);
        assert!(insights[0].actionable);
    }

    #[test]
    fn test_slow_handoff_optimization() {
        let history = history_of(&[(true, 12_000), (true, 15_000)]);
        let insights = analyze(&history, 100, Utc::now());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].kind, InsightKind::Optimization);
        assert_eq!(insights[0].priority, InsightPriority::Medium);
    }

    #[test]
    fn test_healthy_history_is_quiet() {
        let history = history_of(&[(true, 500); 10]);
        assert!(analyze(&history, 100, Utc::now()).is_empty());
        assert!(analyze(&SwitchHistory::new(10), 100, Utc::now()).is_empty());
    }
}
