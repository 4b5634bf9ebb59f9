//! Evaluation of pattern conditions against a request's JSON view.

use crate::types::{ConditionOperator, ConditionValue, PatternCondition};
use serde_json::Value;

const EPSILON: f64 = 1e-9;

/// Resolve a dotted path (`target.required_capabilities.0`) inside `root`.
///
/// Object keys and numeric array indices are supported. `None` means the path
/// is unresolvable, and conditions over it never hold. JSON `null` counts as
/// unresolvable too.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn value_equals(actual: &Value, expected: &ConditionValue) -> bool {
    match (actual, expected) {
        (Value::String(s), ConditionValue::Text(t)) => s == t,
        (Value::Number(n), ConditionValue::Number(x)) => n
            .as_f64()
            .map(|v| (v - x).abs() < EPSILON)
            .unwrap_or(false),
        (Value::Bool(b), ConditionValue::Bool(x)) => b == x,
        _ => false,
    }
}

/// Whether a single condition holds for `context`.
pub fn evaluate(condition: &PatternCondition, context: &Value) -> bool {
    let Some(actual) = resolve_path(context, &condition.field) else {
        return false;
    };

    match condition.operator {
        ConditionOperator::Equals => value_equals(actual, &condition.value),
        ConditionOperator::NotEquals => !value_equals(actual, &condition.value),
        ConditionOperator::GreaterThan => match (actual.as_f64(), &condition.value) {
            (Some(v), ConditionValue::Number(x)) => v > *x,
            _ => false,
        },
        ConditionOperator::LessThan => match (actual.as_f64(), &condition.value) {
            (Some(v), ConditionValue::Number(x)) => v < *x,
            _ => false,
        },
        ConditionOperator::Contains => match (actual, &condition.value) {
            (Value::String(s), ConditionValue::Text(t)) => s.contains(t.as_str()),
            (Value::Array(items), expected) => items.iter().any(|i| value_equals(i, expected)),
            _ => false,
        },
        ConditionOperator::InRange => match (actual.as_f64(), &condition.value) {
            (Some(v), ConditionValue::Range(lo, hi)) => v >= *lo && v <= *hi,
            _ => false,
        },
    }
}

/// Weighted fraction of satisfied conditions, in [0,1].
///
/// A pattern without conditions (or with zero total weight) scores 0.
pub fn match_score(conditions: &[PatternCondition], context: &Value) -> f64 {
    let total: f64 = conditions.iter().map(|c| c.weight.max(0.0)).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let satisfied: f64 = conditions
        .iter()
        .filter(|c| evaluate(c, context))
        .map(|c| c.weight.max(0.0))
        .sum();
    (satisfied / total).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, operator: ConditionOperator, value: ConditionValue) -> PatternCondition {
        PatternCondition {
            field: field.to_string(),
            operator,
            value,
            weight: 1.0,
        }
    }

    fn ctx() -> Value {
        json!({
            "current_agent_id": "agent-a",
            "hour_of_day": 14,
            "urgency": "high",
            "target": {
                "required_capabilities": ["search", "summarize"],
                "min_success_rate": 0.75
            },
            "missing": null
        })
    }

    #[test]
    fn test_resolve_nested_and_index() {
        let c = ctx();
        assert_eq!(
            resolve_path(&c, "target.required_capabilities.1"),
            Some(&json!("summarize"))
        );
        assert!(resolve_path(&c, "target.nope").is_none());
        assert!(resolve_path(&c, "current_agent_id.deeper").is_none());
        assert!(resolve_path(&c, "missing").is_none());
    }

    #[test]
    fn test_equals_and_not_equals() {
        let c = ctx();
        let eq = cond(
            "current_agent_id",
            ConditionOperator::Equals,
            ConditionValue::Text("agent-a".into()),
        );
        assert!(evaluate(&eq, &c));

        let ne = cond(
            "current_agent_id",
            ConditionOperator::NotEquals,
            ConditionValue::Text("agent-b".into()),
        );
        assert!(evaluate(&ne, &c));

        // Unresolvable paths fail even for NOT_EQUALS.
        let ne_missing = cond(
            "previous_agent_id",
            ConditionOperator::NotEquals,
            ConditionValue::Text("agent-b".into()),
        );
        assert!(!evaluate(&ne_missing, &c));
    }

    #[test]
    fn test_numeric_operators() {
        let c = ctx();
        assert!(evaluate(
            &cond(
                "target.min_success_rate",
                ConditionOperator::GreaterThan,
                ConditionValue::Number(0.5)
            ),
            &c
        ));
        assert!(evaluate(
            &cond(
                "hour_of_day",
                ConditionOperator::LessThan,
                ConditionValue::Number(15.0)
            ),
            &c
        ));
        // Type mismatch never matches.
        assert!(!evaluate(
            &cond(
                "urgency",
                ConditionOperator::GreaterThan,
                ConditionValue::Number(1.0)
            ),
            &c
        ));
    }

    #[test]
    fn test_in_range_inclusive() {
        let c = ctx();
        for (lo, hi, expected) in [(14.0, 14.0, true), (9.0, 13.0, false), (14.0, 20.0, true)] {
            let condition = cond(
                "hour_of_day",
                ConditionOperator::InRange,
                ConditionValue::Range(lo, hi),
            );
            assert_eq!(evaluate(&condition, &c), expected, "range {lo}..={hi}");
        }
    }

    #[test]
    fn test_contains_string_and_array() {
        let c = ctx();
        assert!(evaluate(
            &cond(
                "current_agent_id",
                ConditionOperator::Contains,
                ConditionValue::Text("agent".into())
            ),
            &c
        ));
        assert!(evaluate(
            &cond(
                "target.required_capabilities",
                ConditionOperator::Contains,
                ConditionValue::Text("search".into())
            ),
            &c
        ));
        assert!(!evaluate(
            &cond(
                "target.required_capabilities",
                ConditionOperator::Contains,
                ConditionValue::Text("translate".into())
            ),
            &c
        ));
    }

    #[test]
    fn test_weighted_match_score() {
        let c = ctx();
        let mut hit = cond(
            "current_agent_id",
            ConditionOperator::Equals,
            ConditionValue::Text("agent-a".into()),
        );
        hit.weight = 3.0;
        let miss = cond(
            "urgency",
            ConditionOperator::Equals,
            ConditionValue::Text("low".into()),
        );
        let score = match_score(&[hit, miss], &c);
        assert!((score - 0.75).abs() < 1e-9);
        assert_eq!(match_score(&[], &c), 0.0);
    }
}
