use crate::condition::match_score;
use crate::types::{PredictionResult, SwitchPattern, SwitchRequest, Urgency};
use chrono::{DateTime, Duration, Utc};

/// Minimum match score for a pattern to take part in a prediction.
pub const PREDICTION_MATCH_THRESHOLD: f64 = 0.6;
const LOW_CONFIDENCE: f64 = 0.7;
const FAST_COMPLETION_MS: f64 = 3_000.0;
const STALE_AFTER_DAYS: i64 = 7;

/// Patterns whose conditions match `request` with a score of at least `threshold`.
pub fn matching_patterns<'a>(
    patterns: impl IntoIterator<Item = &'a SwitchPattern>,
    request: &SwitchRequest,
    threshold: f64,
) -> Vec<(&'a SwitchPattern, f64)> {
    let context = request.match_context();
    patterns
        .into_iter()
        .filter_map(|p| {
            let score = match_score(&p.conditions, &context);
            (score >= threshold).then_some((p, score))
        })
        .collect()
}

/// Combine every matching pattern into one weighted suggestion.
///
/// Each pattern contributes `confidence × frequency` to every one of its
/// outcomes; the target agent with the largest accumulated weight wins.
/// Agents in the request's exclusion list are never suggested. Returns `None`
/// when nothing matches or every candidate target is excluded.
pub fn predict<'a>(
    patterns: impl IntoIterator<Item = &'a SwitchPattern>,
    request: &SwitchRequest,
    now: DateTime<Utc>,
) -> Option<PredictionResult> {
    let mut matched = matching_patterns(patterns, request, PREDICTION_MATCH_THRESHOLD);
    if matched.is_empty() {
        return None;
    }
    matched.sort_by(|(a, _), (b, _)| weight(b).total_cmp(&weight(a)));

    let mut total_weight = 0.0;
    let mut success = 0.0;
    let mut satisfaction = 0.0;
    let mut completion = 0.0;
    // First-seen order breaks ties between equally weighted agents.
    let mut agents: Vec<(String, f64)> = Vec::new();

    for (pattern, _) in &matched {
        let w = weight(pattern);
        for outcome in &pattern.outcomes {
            if request
                .target
                .exclude_agents
                .iter()
                .any(|a| a == &outcome.target_agent_id)
            {
                continue;
            }
            total_weight += w;
            success += w * outcome.success_probability;
            satisfaction += w * outcome.avg_satisfaction;
            completion += w * outcome.avg_completion_ms;
            match agents.iter_mut().find(|(id, _)| id == &outcome.target_agent_id) {
                Some((_, acc)) => *acc += w,
                None => agents.push((outcome.target_agent_id.clone(), w)),
            }
        }
    }

    let mut best: Option<&(String, f64)> = None;
    for entry in &agents {
        if best.map_or(true, |b| entry.1 > b.1) {
            best = Some(entry);
        }
    }
    let suggested = best?.0.clone();

    let mean = |sum: f64| if total_weight > 0.0 { sum / total_weight } else { 0.0 };
    let expected_completion_ms = mean(completion);

    let frequency_total: u64 = matched.iter().map(|(p, _)| p.frequency).sum();
    let confidence = if frequency_total == 0 {
        0.0
    } else {
        matched
            .iter()
            .map(|(p, _)| p.confidence * p.frequency as f64)
            .sum::<f64>()
            / frequency_total as f64
    };

    let top = matched[0].0;
    let mut reasoning = vec![format!(
        "Based on {} matching pattern(s) from historical switches",
        matched.len()
    )];
    reasoning.push(format!(
        "Strongest pattern {} has {:.0}% confidence over {} observations",
        top.id,
        top.confidence * 100.0,
        top.frequency
    ));
    if expected_completion_ms < FAST_COMPLETION_MS {
        reasoning.push(format!(
            "Fast completion expected (~{expected_completion_ms:.0}ms)"
        ));
    }

    let mut risk_factors = Vec::new();
    if matched.iter().any(|(p, _)| p.confidence < LOW_CONFIDENCE) {
        risk_factors.push("Low confidence in one or more matching patterns".to_string());
    }
    if matches!(request.urgency, Urgency::High | Urgency::Critical) {
        risk_factors.push("High urgency request leaves little room for a failed switch".to_string());
    }
    let stale_cutoff = now - Duration::days(STALE_AFTER_DAYS);
    if matched.iter().any(|(p, _)| p.last_observed < stale_cutoff) {
        risk_factors.push(format!(
            "Some matching patterns have not been observed in over {STALE_AFTER_DAYS} days"
        ));
    }

    Some(PredictionResult {
        suggested_agent_id: suggested,
        success_probability: mean(success),
        expected_satisfaction: mean(satisfaction),
        expected_completion_ms,
        confidence: confidence.clamp(0.0, 1.0),
        matched_patterns: matched.iter().map(|(p, _)| p.id.clone()).collect(),
        reasoning,
        risk_factors,
    })
}

fn weight(pattern: &SwitchPattern) -> f64 {
    pattern.confidence * pattern.frequency as f64
}
