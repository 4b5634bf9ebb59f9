#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use switchboard_core::{Clock, EventBus, ManualClock, OrchestrationEvent};
use switchboard_learning::*;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap()
}

fn learner_with(config: LearningConfig) -> (SwitchPatternLearner, Arc<ManualClock>, EventBus) {
    let clock = Arc::new(ManualClock::new(start()));
    let events = EventBus::new(256);
    let learner = SwitchPatternLearner::new(config, clock.clone(), events.clone());
    (learner, clock, events)
}

fn record(
    learner: &SwitchPatternLearner,
    clock: &ManualClock,
    from: &str,
    to: &str,
    ok: bool,
    ms: u64,
) {
    let now = clock.now();
    let request = SwitchRequest::new(SwitchReason::LoadBalancing, Urgency::Low, now).from_agent(from);
    let result = SwitchResult::new(&request, ok, now).to_agent(to).with_duration(ms);
    learner.learn_from_result(result, request);
    clock.advance(Duration::minutes(1));
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ---------------------------------------------------------------------------
// 1. Learn then predict
// ---------------------------------------------------------------------------

#[test]
fn repeated_handoffs_become_a_prediction() {
    let (learner, clock, _) = learner_with(LearningConfig::default());
    let ask = SwitchRequest::new(SwitchReason::Timeout, Urgency::Low, start()).from_agent("A");

    for _ in 0..4 {
        record(&learner, &clock, "A", "B", true, 1200);
    }
    assert!(learner.patterns().is_empty());
    assert!(learner.predict(&ask).is_none());

    record(&learner, &clock, "A", "B", true, 1200);
    let seq = learner.pattern("sequential:A->B").unwrap();
    assert_eq!(seq.frequency, 5);
    assert!(approx(seq.confidence, 0.9));
    let hourly = learner.pattern("time_based:14").unwrap();
    assert!(approx(hourly.confidence, 0.8));

    let prediction = learner.predict(&ask).unwrap();
    assert_eq!(prediction.suggested_agent_id, "B");
    assert_eq!(
        prediction.matched_patterns,
        vec!["sequential:A->B".to_string(), "time_based:14".to_string()]
    );
    assert!(approx(prediction.confidence, 0.85));
    assert!(approx(prediction.success_probability, 1.0));
    assert!(approx(prediction.expected_completion_ms, 1200.0));
    assert!(prediction.reasoning.iter().any(|r| r.starts_with("Fast completion")));
    assert!(prediction.risk_factors.is_empty());
}

#[test]
fn failure_smooths_confidence_down() {
    let (learner, clock, _) = learner_with(LearningConfig::default());
    for _ in 0..5 {
        record(&learner, &clock, "A", "B", true, 500);
    }
    record(&learner, &clock, "A", "B", false, 500);

    let seq = learner.pattern("sequential:A->B").unwrap();
    assert_eq!(seq.frequency, 6);
    // 0.9 * 0.9 + 0.5 * 0.1
    assert!(approx(seq.confidence, 0.86));
    assert!(approx(seq.success_rate, 5.0 / 6.0));
}

#[test]
fn slow_switches_match_the_hour_they_were_requested_in() {
    let (learner, clock, _) = learner_with(LearningConfig::default());
    clock.set(Utc.with_ymd_and_hms(2025, 6, 2, 10, 59, 0).unwrap());
    for _ in 0..5 {
        let requested = clock.now();
        let request = SwitchRequest::new(SwitchReason::LoadBalancing, Urgency::Low, requested)
            .from_agent("A");
        let result = SwitchResult::new(&request, true, requested + Duration::minutes(2))
            .to_agent("B")
            .with_duration(120_000);
        learner.learn_from_result(result, request);
        clock.advance(Duration::days(1));
    }

    assert!(learner.pattern("time_based:10").is_some());
    assert!(learner.pattern("time_based:11").is_none());

    // No sequential hint: only the hourly pattern can answer.
    let ask = SwitchRequest::new(
        SwitchReason::Timeout,
        Urgency::Low,
        Utc.with_ymd_and_hms(2025, 6, 9, 10, 59, 0).unwrap(),
    );
    let prediction = learner.predict(&ask).unwrap();
    assert_eq!(prediction.suggested_agent_id, "B");
    assert_eq!(prediction.matched_patterns, vec!["time_based:10".to_string()]);
}

#[test]
fn excluded_target_is_never_suggested() {
    let (learner, clock, _) = learner_with(LearningConfig::default());
    for _ in 0..5 {
        record(&learner, &clock, "A", "B", true, 500);
    }
    let ask = SwitchRequest::new(SwitchReason::Escalation, Urgency::High, start())
        .from_agent("A")
        .with_target(TargetCriteria {
            exclude_agents: vec!["B".into()],
            ..TargetCriteria::default()
        });
    assert!(learner.predict(&ask).is_none());
}

#[test]
fn predictive_analysis_can_be_disabled() {
    let (learner, clock, _) = learner_with(LearningConfig {
        predictive_analysis: false,
        ..LearningConfig::default()
    });
    for _ in 0..5 {
        record(&learner, &clock, "A", "B", true, 500);
    }
    assert_eq!(learner.patterns().len(), 2);
    let ask = SwitchRequest::new(SwitchReason::Timeout, Urgency::Low, start()).from_agent("A");
    assert!(learner.predict(&ask).is_none());
}

// ---------------------------------------------------------------------------
// 2. Maintenance
// ---------------------------------------------------------------------------

#[test]
fn optimize_reblends_surviving_patterns() {
    let (learner, clock, events) = learner_with(LearningConfig::default());
    for _ in 0..5 {
        record(&learner, &clock, "A", "B", true, 500);
    }
    let mut rx = events.subscribe();

    let report = learner.optimize();
    assert_eq!(
        report,
        OptimizationReport {
            removed: 0,
            detected: 0,
            remaining: 2,
        }
    );
    assert!(approx(learner.pattern("sequential:A->B").unwrap().confidence, 0.91));
    assert!(approx(learner.pattern("time_based:14").unwrap().confidence, 0.82));

    match rx.try_recv().unwrap() {
        OrchestrationEvent::PatternsOptimized { removed, remaining, .. } => {
            assert_eq!((removed, remaining), (0, 2));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn failing_switches_warn_and_insights_expire() {
    let (learner, clock, events) = learner_with(LearningConfig::default());
    let mut rx = events.subscribe();
    for _ in 0..5 {
        record(&learner, &clock, "A", "C", false, 500);
    }

    assert!(learner.patterns().is_empty());
    let insights = learner.insights();
    assert_eq!(insights.len(), 5);
    assert!(insights.iter().all(|i| i.title == "Declining Success Rate"));
    assert!(insights.iter().all(|i| i.priority == InsightPriority::High));

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    assert_eq!(names.iter().filter(|n| **n == "insight:generated").count(), 5);
    assert_eq!(names.iter().filter(|n| **n == "pattern:learned").count(), 5);

    clock.advance(Duration::days(8));
    assert_eq!(learner.prune_insights(), 5);
    assert!(learner.insights().is_empty());
}

#[test]
fn stats_and_clear() {
    let (learner, clock, _) = learner_with(LearningConfig::default());
    for i in 0..6 {
        record(&learner, &clock, "A", "B", i != 0, 500);
    }
    let stats = learner.stats();
    assert_eq!(stats.history_size, 6);
    assert_eq!(stats.total_patterns, 2);
    assert_eq!(stats.patterns_by_type.get("sequential"), Some(&1));
    assert_eq!(stats.patterns_by_type.get("time_based"), Some(&1));
    assert!(approx(stats.overall_success_rate, 5.0 / 6.0));
    assert_eq!(stats.recent_patterns, 2);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["history_size"], 6);

    learner.clear();
    assert_eq!(learner.stats(), LearningStats::default());
}
