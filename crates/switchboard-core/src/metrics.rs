use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Counter sink consumed by the scheduler for submitted/completed/failed
/// tasks and agent switches.
pub trait MetricsSink: Send + Sync {
    /// Increment the counter `name` with the given labels by one.
    fn increment(&self, name: &str, labels: &[(&str, &str)]);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &str, _labels: &[(&str, &str)]) {}
}

/// Keeps counters in memory, keyed by name and sorted label set.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: RwLock<BTreeMap<String, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, labels: &[(&str, &str)]) -> String {
        if labels.is_empty() {
            return name.to_string();
        }
        let mut sorted: Vec<&(&str, &str)> = labels.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        let rendered: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{name}{{{}}}", rendered.join(","))
    }

    /// Value of a single labelled counter.
    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .read()
            .get(&Self::key(name, labels))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of a counter across every label combination.
    pub fn total(&self, name: &str) -> u64 {
        let prefix = format!("{name}{{");
        self.counters
            .read()
            .iter()
            .filter(|(k, _)| k.as_str() == name || k.starts_with(&prefix))
            .map(|(_, v)| *v)
            .sum()
    }

    /// Serialize all counters as a flat JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let counters = self.counters.read();
        serde_json::json!(*counters)
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        let key = Self::key(name, labels);
        *self.counters.write().entry(key).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_label() {
        let metrics = InMemoryMetrics::new();
        metrics.increment("tasks_total", &[("status", "completed"), ("queue", "q")]);
        metrics.increment("tasks_total", &[("queue", "q"), ("status", "completed")]);
        metrics.increment("tasks_total", &[("queue", "q"), ("status", "failed")]);

        assert_eq!(
            metrics.get("tasks_total", &[("status", "completed"), ("queue", "q")]),
            2
        );
        assert_eq!(metrics.total("tasks_total"), 3);
        assert_eq!(metrics.total("agent_switches_total"), 0);
    }

    #[test]
    fn test_to_json() {
        let metrics = InMemoryMetrics::new();
        metrics.increment("agent_switches_total", &[]);
        let json = metrics.to_json();
        assert_eq!(json["agent_switches_total"], 1);
    }
}
