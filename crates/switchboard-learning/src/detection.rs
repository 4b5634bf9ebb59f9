//! Pattern detectors run over the recent switch history.

use crate::types::{
    ConditionOperator, ConditionValue, PatternCondition, PatternOutcome, PatternType,
    SwitchPattern, SwitchRecord,
};
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;

const SEQUENTIAL_CONFIDENCE_CAP: f64 = 0.9;
const TIME_BASED_CONFIDENCE_CAP: f64 = 0.8;

/// Inputs shared by every detector for one detection pass.
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext {
    pub minimum_occurrences: u64,
    pub now: DateTime<Utc>,
}

/// A strategy for turning switch history into candidate patterns.
///
/// Detectors only propose candidates; the learner decides which ones to keep.
pub trait PatternDetector: Send + Sync {
    fn pattern_type(&self) -> PatternType;
    fn detect(&self, records: &[&SwitchRecord], ctx: &DetectionContext) -> Vec<SwitchPattern>;
}

/// The detectors the learner runs by default.
pub fn default_detectors() -> Vec<Box<dyn PatternDetector>> {
    vec![
        Box::new(SequentialDetector),
        Box::new(TimeBasedDetector),
        Box::new(LoadBasedDetector),
    ]
}

/// Running tallies for one target agent.
#[derive(Debug, Default)]
struct OutcomeTally {
    count: u64,
    successes: u64,
    satisfaction_sum: f64,
    satisfaction_count: u64,
    duration_sum: u64,
    last_seen: Option<DateTime<Utc>>,
}

impl OutcomeTally {
    fn add(&mut self, record: &SwitchRecord) {
        self.count += 1;
        if record.result.success {
            self.successes += 1;
        }
        if let Some(s) = record.result.metrics.satisfaction {
            self.satisfaction_sum += s;
            self.satisfaction_count += 1;
        }
        self.duration_sum += record.result.duration_ms;
        let at = record.result.completed_at;
        self.last_seen = Some(self.last_seen.map_or(at, |prev| prev.max(at)));
    }

    fn success_ratio(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.successes as f64 / self.count as f64
        }
    }

    fn outcome(&self, target_agent_id: &str) -> PatternOutcome {
        PatternOutcome {
            target_agent_id: target_agent_id.to_string(),
            success_probability: self.success_ratio(),
            avg_satisfaction: if self.satisfaction_count == 0 {
                0.0
            } else {
                self.satisfaction_sum / self.satisfaction_count as f64
            },
            avg_completion_ms: if self.count == 0 {
                0.0
            } else {
                self.duration_sum as f64 / self.count as f64
            },
        }
    }
}

/// Detects recurring `from → to` agent transitions.
pub struct SequentialDetector;

impl PatternDetector for SequentialDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::Sequential
    }

    fn detect(&self, records: &[&SwitchRecord], ctx: &DetectionContext) -> Vec<SwitchPattern> {
        // Vec keeps first-seen order so output is deterministic.
        let mut pairs: Vec<((String, String), OutcomeTally)> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();

        for record in records {
            let (Some(from), Some(to)) = (
                record.request.current_agent_id.as_ref(),
                record.result.new_agent_id.as_ref(),
            ) else {
                continue;
            };
            let key = (from.clone(), to.clone());
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                pairs.push((key, OutcomeTally::default()));
                pairs.len() - 1
            });
            pairs[slot].1.add(record);
        }

        pairs
            .into_iter()
            .filter(|(_, tally)| tally.count >= ctx.minimum_occurrences)
            .map(|((from, to), tally)| SwitchPattern {
                id: format!("sequential:{from}->{to}"),
                pattern_type: PatternType::Sequential,
                conditions: vec![PatternCondition {
                    field: "current_agent_id".to_string(),
                    operator: ConditionOperator::Equals,
                    value: ConditionValue::Text(from),
                    weight: 1.0,
                }],
                outcomes: vec![tally.outcome(&to)],
                frequency: tally.count,
                confidence: tally.success_ratio().min(SEQUENTIAL_CONFIDENCE_CAP),
                learned_at: ctx.now,
                last_observed: tally.last_seen.unwrap_or(ctx.now),
                success_rate: tally.success_ratio(),
            })
            .collect()
    }
}

/// Detects hours of the day with a steady volume of switches.
///
/// Switches are bucketed by the hour they were requested in, the same
/// `hour_of_day` a later request is matched against.
pub struct TimeBasedDetector;

impl PatternDetector for TimeBasedDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::TimeBased
    }

    fn detect(&self, records: &[&SwitchRecord], ctx: &DetectionContext) -> Vec<SwitchPattern> {
        let mut hours: Vec<(OutcomeTally, Vec<(String, OutcomeTally)>)> =
            (0..24).map(|_| (OutcomeTally::default(), Vec::new())).collect();

        for record in records {
            let hour = record.request.requested_at.hour() as usize;
            let (total, targets) = &mut hours[hour];
            total.add(record);
            if let Some(agent) = &record.result.new_agent_id {
                match targets.iter_mut().find(|(id, _)| id == agent) {
                    Some((_, tally)) => tally.add(record),
                    None => {
                        let mut tally = OutcomeTally::default();
                        tally.add(record);
                        targets.push((agent.clone(), tally));
                    }
                }
            }
        }

        hours
            .into_iter()
            .enumerate()
            .filter(|(_, (total, targets))| {
                total.count >= ctx.minimum_occurrences && !targets.is_empty()
            })
            .map(|(hour, (total, mut targets))| {
                // Most frequent target first; stable sort keeps first-seen order on ties.
                targets.sort_by(|a, b| b.1.count.cmp(&a.1.count));
                let h = hour as f64;
                SwitchPattern {
                    id: format!("time_based:{hour:02}"),
                    pattern_type: PatternType::TimeBased,
                    conditions: vec![PatternCondition {
                        field: "hour_of_day".to_string(),
                        operator: ConditionOperator::InRange,
                        value: ConditionValue::Range(h, h),
                        weight: 1.0,
                    }],
                    outcomes: targets.iter().map(|(id, t)| t.outcome(id)).collect(),
                    frequency: total.count,
                    confidence: total.success_ratio().min(TIME_BASED_CONFIDENCE_CAP),
                    learned_at: ctx.now,
                    last_observed: total.last_seen.unwrap_or(ctx.now),
                    success_rate: total.success_ratio(),
                }
            })
            .collect()
    }
}

/// Extension point for load-driven patterns. Detects nothing yet.
pub struct LoadBasedDetector;

impl PatternDetector for LoadBasedDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::LoadBased
    }

    fn detect(&self, _records: &[&SwitchRecord], _ctx: &DetectionContext) -> Vec<SwitchPattern> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SwitchReason, SwitchRequest, SwitchResult, Urgency};
    use chrono::{Duration, TimeZone};

    fn switch(from: &str, to: &str, success: bool, at: DateTime<Utc>) -> SwitchRecord {
        let request =
            SwitchRequest::new(SwitchReason::LoadBalancing, Urgency::Medium, at).from_agent(from);
        let result = SwitchResult::new(&request, success, at)
            .to_agent(to)
            .with_duration(800);
        SwitchRecord { request, result }
    }

    fn ctx(now: DateTime<Utc>) -> DetectionContext {
        DetectionContext {
            minimum_occurrences: 5,
            now,
        }
    }

    #[test]
    fn test_sequential_five_successes() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let records: Vec<SwitchRecord> = (0..5).map(|_| switch("A", "B", true, now)).collect();
        let refs: Vec<&SwitchRecord> = records.iter().collect();

        let patterns = SequentialDetector.detect(&refs, &ctx(now));
        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.id, "sequential:A->B");
        assert_eq!(p.frequency, 5);
        assert_eq!(p.outcomes.len(), 1);
        assert_eq!(p.outcomes[0].target_agent_id, "B");
        assert!((p.outcomes[0].success_probability - 1.0).abs() < 1e-9);
        assert!((p.confidence - 0.9).abs() < 1e-9);
        assert!((p.outcomes[0].avg_completion_ms - 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_sequential_below_minimum() {
        let now = Utc::now();
        let records: Vec<SwitchRecord> = (0..4).map(|_| switch("A", "B", true, now)).collect();
        let refs: Vec<&SwitchRecord> = records.iter().collect();
        assert!(SequentialDetector.detect(&refs, &ctx(now)).is_empty());
    }

    #[test]
    fn test_sequential_mixed_outcomes() {
        let now = Utc::now();
        let mut records: Vec<SwitchRecord> = (0..3).map(|_| switch("A", "B", true, now)).collect();
        records.extend((0..3).map(|_| switch("A", "B", false, now)));
        records.push(switch("A", "C", true, now));
        let refs: Vec<&SwitchRecord> = records.iter().collect();

        let patterns = SequentialDetector.detect(&refs, &ctx(now));
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, 6);
        assert!((patterns[0].confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_time_based_buckets_by_hour() {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 9, 15, 0).unwrap();
        let mut records: Vec<SwitchRecord> = (0..4)
            .map(|i| switch("A", "B", true, base + Duration::days(i)))
            .collect();
        records.push(switch("X", "C", true, base + Duration::minutes(20)));
        records.push(switch("A", "B", true, base + Duration::hours(3)));
        let refs: Vec<&SwitchRecord> = records.iter().collect();

        let patterns = TimeBasedDetector.detect(&refs, &ctx(base));
        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.id, "time_based:09");
        assert_eq!(p.frequency, 5);
        assert_eq!(p.conditions[0].value, ConditionValue::Range(9.0, 9.0));
        assert_eq!(p.outcomes[0].target_agent_id, "B");
        assert_eq!(p.outcomes[1].target_agent_id, "C");
        assert!((p.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_time_based_uses_request_hour() {
        let requested = Utc.with_ymd_and_hms(2024, 6, 1, 10, 59, 0).unwrap();
        let records: Vec<SwitchRecord> = (0..5)
            .map(|i| {
                let at = requested + Duration::days(i);
                let request = SwitchRequest::new(SwitchReason::Timeout, Urgency::Low, at)
                    .from_agent("A");
                let result = SwitchResult::new(&request, true, at + Duration::minutes(2))
                    .to_agent("B");
                SwitchRecord { request, result }
            })
            .collect();
        let refs: Vec<&SwitchRecord> = records.iter().collect();

        let patterns = TimeBasedDetector.detect(&refs, &ctx(requested));
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].id, "time_based:10");
        assert_eq!(patterns[0].conditions[0].value, ConditionValue::Range(10.0, 10.0));
    }

    #[test]
    fn test_load_based_is_empty() {
        let now = Utc::now();
        let records: Vec<SwitchRecord> = (0..20).map(|_| switch("A", "B", true, now)).collect();
        let refs: Vec<&SwitchRecord> = records.iter().collect();
        assert!(LoadBasedDetector.detect(&refs, &ctx(now)).is_empty());
    }
}
