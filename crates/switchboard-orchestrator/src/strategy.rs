//! Ordered assignment rules.
//!
//! Each rule pairs a condition over the task with an action over the
//! candidate list. The first rule whose condition holds and whose action
//! resolves to a candidate decides the assignment; when none does, the
//! highest-scored candidate is used.

use crate::registry::AgentCandidate;
use crate::types::{Priority, Task, TaskKind};
use serde::{Deserialize, Serialize};

/// When a rule applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    Always,
    /// Task priority is this one or more urgent.
    PriorityAtLeast { priority: Priority },
    RequiresCapability { capability: String },
    TaskKind { kind: TaskKind },
}

impl RuleCondition {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::PriorityAtLeast { priority } => task.priority.rank() <= priority.rank(),
            RuleCondition::RequiresCapability { capability } => {
                task.required_capabilities.iter().any(|c| c == capability)
            }
            RuleCondition::TaskKind { kind } => task.kind == *kind,
        }
    }
}

/// How a rule picks among candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// A specific agent, if it is among the candidates.
    AssignTo { agent_id: String },
    LeastLoaded,
    HighestSuccessRate,
    Fastest,
}

impl RuleAction {
    /// Ties go to the earlier candidate.
    pub fn resolve<'a>(&self, candidates: &'a [AgentCandidate]) -> Option<&'a AgentCandidate> {
        match self {
            RuleAction::AssignTo { agent_id } => {
                candidates.iter().find(|c| &c.agent.id == agent_id)
            }
            RuleAction::LeastLoaded => {
                pick_by(candidates, |c| -c.agent.performance.current_load)
            }
            RuleAction::HighestSuccessRate => {
                pick_by(candidates, |c| c.agent.performance.success_rate)
            }
            RuleAction::Fastest => {
                pick_by(candidates, |c| -c.agent.performance.avg_response_time_ms)
            }
        }
    }
}

fn pick_by(
    candidates: &[AgentCandidate],
    key: impl Fn(&AgentCandidate) -> f64,
) -> Option<&AgentCandidate> {
    let mut best: Option<(&AgentCandidate, f64)> = None;
    for candidate in candidates {
        let value = key(candidate);
        if best.map_or(true, |(_, b)| value > b) {
            best = Some((candidate, value));
        }
    }
    best.map(|(c, _)| c)
}

/// One named rule of the orchestration strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRule {
    pub name: String,
    pub when: RuleCondition,
    pub action: RuleAction,
}

impl StrategyRule {
    pub fn new(name: impl Into<String>, when: RuleCondition, action: RuleAction) -> Self {
        Self {
            name: name.into(),
            when,
            action,
        }
    }
}

/// The first rule that applies to `task` and resolves to a candidate.
pub fn apply_rules<'a>(
    rules: &'a [StrategyRule],
    task: &Task,
    candidates: &'a [AgentCandidate],
) -> Option<(&'a StrategyRule, &'a AgentCandidate)> {
    rules
        .iter()
        .filter(|rule| rule.when.matches(task))
        .find_map(|rule| rule.action.resolve(candidates).map(|c| (rule, c)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::{Agent, AgentPerformance};
    use crate::types::NewTask;
    use chrono::Utc;

    fn candidate(id: &str, success: f64, load: f64, avg_ms: f64) -> AgentCandidate {
        let agent = Agent::new(id, &["x"]).with_performance(AgentPerformance {
            success_rate: success,
            current_load: load,
            avg_response_time_ms: avg_ms,
            ..AgentPerformance::default()
        });
        AgentCandidate {
            score: agent.score(),
            agent,
        }
    }

    fn task(priority: Priority) -> Task {
        Task::from_submission(
            NewTask::simple("t1", &["x"]).with_priority(priority),
            TaskKind::Simple,
            Utc::now(),
        )
    }

    #[test]
    fn test_conditions() {
        let high = task(Priority::High);
        assert!(RuleCondition::Always.matches(&high));
        assert!(RuleCondition::PriorityAtLeast {
            priority: Priority::High
        }
        .matches(&high));
        assert!(!RuleCondition::PriorityAtLeast {
            priority: Priority::Urgent
        }
        .matches(&high));
        assert!(RuleCondition::RequiresCapability {
            capability: "x".into()
        }
        .matches(&high));
        assert!(!RuleCondition::TaskKind {
            kind: TaskKind::MultiAgentWorkflow
        }
        .matches(&high));
    }

    #[test]
    fn test_actions() {
        let candidates = vec![
            candidate("a", 0.9, 0.8, 500.0),
            candidate("b", 0.7, 0.1, 2000.0),
            candidate("c", 0.95, 0.5, 100.0),
        ];
        assert_eq!(
            RuleAction::LeastLoaded.resolve(&candidates).unwrap().agent.id,
            "b"
        );
        assert_eq!(
            RuleAction::HighestSuccessRate
                .resolve(&candidates)
                .unwrap()
                .agent
                .id,
            "c"
        );
        assert_eq!(RuleAction::Fastest.resolve(&candidates).unwrap().agent.id, "c");
        assert!(RuleAction::AssignTo {
            agent_id: "ghost".into()
        }
        .resolve(&candidates)
        .is_none());
        assert!(RuleAction::LeastLoaded.resolve(&[]).is_none());
    }

    #[test]
    fn test_ties_go_to_earlier_candidate() {
        let candidates = vec![candidate("a", 0.9, 0.2, 0.0), candidate("b", 0.9, 0.2, 0.0)];
        assert_eq!(
            RuleAction::LeastLoaded.resolve(&candidates).unwrap().agent.id,
            "a"
        );
    }

    #[test]
    fn test_first_resolving_rule_wins() {
        let rules = vec![
            StrategyRule::new(
                "pinned",
                RuleCondition::Always,
                RuleAction::AssignTo {
                    agent_id: "offline".into(),
                },
            ),
            StrategyRule::new(
                "urgent-fast",
                RuleCondition::PriorityAtLeast {
                    priority: Priority::Urgent,
                },
                RuleAction::Fastest,
            ),
            StrategyRule::new("spread", RuleCondition::Always, RuleAction::LeastLoaded),
        ];
        let candidates = vec![candidate("slow", 1.0, 0.0, 3000.0), candidate("quick", 1.0, 0.9, 10.0)];

        let (rule, chosen) = apply_rules(&rules, &task(Priority::Critical), &candidates).unwrap();
        assert_eq!(rule.name, "urgent-fast");
        assert_eq!(chosen.agent.id, "quick");

        let (rule, chosen) = apply_rules(&rules, &task(Priority::Low), &candidates).unwrap();
        assert_eq!(rule.name, "spread");
        assert_eq!(chosen.agent.id, "slow");

        assert!(apply_rules(&[], &task(Priority::Low), &candidates).is_none());
    }

    #[test]
    fn test_rules_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            strategy: Vec<StrategyRule>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [[strategy]]
            name = "critical-to-senior"
            when = { type = "priority_at_least", priority = "critical" }
            action = { type = "assign_to", agent_id = "senior" }
            "#,
        )
        .unwrap();
        assert_eq!(parsed.strategy.len(), 1);
        assert_eq!(
            parsed.strategy[0].action,
            RuleAction::AssignTo {
                agent_id: "senior".into()
            }
        );
    }
}
