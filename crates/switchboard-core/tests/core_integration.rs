#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use switchboard_core::*;

// ---------------------------------------------------------------------------
// 1. Error codes and retryability
// ---------------------------------------------------------------------------

#[test]
fn error_codes_are_stable() {
    let cases: Vec<(SwitchboardError, &str, bool)> = vec![
        (SwitchboardError::Validation("id".into()), "ValidationError", false),
        (SwitchboardError::NoSuitableAgent("ocr".into()), "NoSuitableAgent", true),
        (SwitchboardError::TaskTimeout("t1".into()), "TaskTimeout", true),
        (SwitchboardError::TaskFailed("boom".into()), "TaskFailed", true),
        (SwitchboardError::NotFound("t9".into()), "NotFound", false),
        (SwitchboardError::Dispatch("closed".into()), "DispatchError", true),
        (SwitchboardError::Config("bad".into()), "ConfigError", false),
        (SwitchboardError::Learning("empty".into()), "LearningError", false),
    ];
    for (err, code, retryable) in cases {
        assert_eq!(err.code(), code, "{err}");
        assert_eq!(err.is_retryable(), retryable, "{err}");
    }
}

#[test]
fn invalid_transition_message() {
    let err = SwitchboardError::invalid_transition("t1", "completed", "cancel");
    assert_eq!(err.code(), "InvalidStateTransition");
    assert_eq!(
        err.to_string(),
        "Invalid state transition: cannot cancel task t1 in status completed"
    );
}

#[test]
fn io_and_json_errors_convert() {
    fn read() -> SwitchboardResult<String> {
        Ok(std::fs::read_to_string("/definitely/not/here")?)
    }
    fn parse() -> SwitchboardResult<serde_json::Value> {
        Ok(serde_json::from_str("{not json")?)
    }
    assert_eq!(read().unwrap_err().code(), "IoError");
    assert_eq!(parse().unwrap_err().code(), "JsonError");
}

// ---------------------------------------------------------------------------
// 2. Clock
// ---------------------------------------------------------------------------

#[test]
fn manual_clock_through_trait_object() {
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 23, 30, 0).unwrap();
    let manual = Arc::new(ManualClock::new(start));
    let clock: Arc<dyn Clock> = manual.clone();

    assert_eq!(clock.now(), start);
    manual.advance(Duration::minutes(45));
    assert_eq!(clock.now(), start + Duration::minutes(45));

    let later = Utc.with_ymd_and_hms(2025, 3, 5, 8, 0, 0).unwrap();
    manual.set(later);
    assert_eq!(clock.now(), later);
}

#[test]
fn system_clock_moves_forward() {
    let a = SystemClock.now();
    let b = SystemClock.now();
    assert!(b >= a);
}

// ---------------------------------------------------------------------------
// 3. Event bus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_fan_out_in_order() {
    let bus = EventBus::new(16);
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    let now = Utc::now();
    bus.publish(OrchestrationEvent::TaskSubmitted {
        task_id: "t1".into(),
        priority: "high".into(),
        timestamp: now,
    });
    bus.publish(OrchestrationEvent::TaskCancelled {
        task_id: "t1".into(),
        reason: "user".into(),
        timestamp: now,
    });

    for rx in [&mut first, &mut second] {
        assert_eq!(rx.recv().await.unwrap().name(), "task:submitted");
        assert_eq!(rx.recv().await.unwrap().name(), "task:cancelled");
    }
}

#[tokio::test]
async fn late_subscriber_misses_earlier_events() {
    let bus = EventBus::default();
    bus.publish(OrchestrationEvent::TaskRetried {
        task_id: "early".into(),
        timestamp: Utc::now(),
    });
    let mut rx = bus.subscribe();
    bus.publish(OrchestrationEvent::TaskRetried {
        task_id: "late".into(),
        timestamp: Utc::now(),
    });
    match rx.recv().await.unwrap() {
        OrchestrationEvent::TaskRetried { task_id, .. } => assert_eq!(task_id, "late"),
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn event_json_is_tagged() {
    let event = OrchestrationEvent::InsightGenerated {
        title: "Peak hours".into(),
        kind: "optimization".into(),
        priority: "medium".into(),
        timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "insight_generated");
    assert_eq!(json["title"], "Peak hours");

    let back: OrchestrationEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}

// ---------------------------------------------------------------------------
// 4. Metrics
// ---------------------------------------------------------------------------

#[test]
fn metrics_label_order_does_not_matter() {
    let metrics = InMemoryMetrics::new();
    metrics.increment("tasks_failed_total", &[("queue", "q"), ("code", "TaskTimeout")]);
    metrics.increment("tasks_failed_total", &[("code", "TaskTimeout"), ("queue", "q")]);
    metrics.increment("tasks_failed_total", &[("code", "TaskFailed"), ("queue", "q")]);

    assert_eq!(
        metrics.get("tasks_failed_total", &[("code", "TaskTimeout"), ("queue", "q")]),
        2
    );
    assert_eq!(metrics.total("tasks_failed_total"), 3);
    assert_eq!(metrics.total("tasks_failed"), 0);
}

#[test]
fn metrics_sink_trait_object() {
    let sinks: Vec<Arc<dyn MetricsSink>> = vec![Arc::new(NoopMetrics), Arc::new(InMemoryMetrics::new())];
    for sink in &sinks {
        sink.increment("tasks_cancelled_total", &[]);
    }

    let metrics = InMemoryMetrics::new();
    metrics.increment("tasks_cancelled_total", &[]);
    let json = metrics.to_json();
    assert_eq!(json["tasks_cancelled_total"], 1);
}
