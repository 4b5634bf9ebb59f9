use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use switchboard_core::{SwitchboardError, SwitchboardResult};
use tracing::debug;

/// Availability of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    Offline,
}

/// Rolling performance statistics for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    /// Fraction of finished tasks that succeeded, in [0,1].
    pub success_rate: f64,
    /// Running average of completion time.
    pub avg_response_time_ms: f64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Load estimate in [0,1].
    pub current_load: f64,
}

impl Default for AgentPerformance {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            avg_response_time_ms: 0.0,
            tasks_completed: 0,
            tasks_failed: 0,
            current_load: 0.0,
        }
    }
}

/// A worker able to execute tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub performance: AgentPerformance,
}

impl Agent {
    pub fn new(id: impl Into<String>, capabilities: &[&str]) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            status: AgentStatus::Idle,
            performance: AgentPerformance::default(),
        }
    }

    pub fn with_performance(mut self, performance: AgentPerformance) -> Self {
        self.performance = performance;
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Weighted suitability score in [0,1].
    ///
    /// `0.5·success + 0.3·(1 − load) + 0.2·speed`, where speed decays with
    /// the average response time (1.0 at 0 ms, 0.5 at 1 s).
    pub fn score(&self) -> f64 {
        let p = &self.performance;
        let speed = 1.0 / (1.0 + p.avg_response_time_ms.max(0.0) / 1000.0);
        0.5 * p.success_rate.clamp(0.0, 1.0)
            + 0.3 * (1.0 - p.current_load.clamp(0.0, 1.0))
            + 0.2 * speed
    }
}

/// What an assignment needs from an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRequirements {
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub min_success_rate: Option<f64>,
}

impl AgentRequirements {
    pub fn for_capabilities(capabilities: &[String]) -> Self {
        Self {
            capabilities: capabilities.to_vec(),
            ..Self::default()
        }
    }
}

/// An agent that satisfies a set of requirements, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCandidate {
    pub agent: Agent,
    pub score: f64,
}

/// Source of truth for agents, consumed by the scheduler.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Available agents offering every required capability, best first.
    async fn find_suitable_agents(
        &self,
        requirements: &AgentRequirements,
    ) -> SwitchboardResult<Vec<AgentCandidate>>;

    async fn get_agent(&self, agent_id: &str) -> SwitchboardResult<Option<Agent>>;

    async fn update_agent_status(&self, agent_id: &str, status: AgentStatus)
        -> SwitchboardResult<()>;

    async fn update_agent_performance(
        &self,
        agent_id: &str,
        performance: AgentPerformance,
    ) -> SwitchboardResult<()>;

    /// Every non-offline agent offering `capability`, in registration order.
    async fn get_agents_by_capability(&self, capability: &str) -> SwitchboardResult<Vec<Agent>>;
}

/// Registry kept in process memory. Registration order breaks score ties.
#[derive(Debug, Default)]
pub struct InMemoryAgentRegistry {
    agents: RwLock<Vec<Agent>>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(agents: impl IntoIterator<Item = Agent>) -> Self {
        let registry = Self::new();
        for agent in agents {
            registry.register(agent);
        }
        registry
    }

    /// Add an agent, replacing any previous registration with the same id.
    pub fn register(&self, agent: Agent) {
        let mut agents = self.agents.write();
        match agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent,
            None => {
                debug!(agent_id = %agent.id, "Agent registered");
                agents.push(agent);
            }
        }
    }

    pub fn unregister(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.write();
        let before = agents.len();
        agents.retain(|a| a.id != agent_id);
        agents.len() != before
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.agents.read().clone()
    }

    fn with_agent<T>(
        &self,
        agent_id: &str,
        f: impl FnOnce(&mut Agent) -> T,
    ) -> SwitchboardResult<T> {
        let mut agents = self.agents.write();
        agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .map(f)
            .ok_or_else(|| SwitchboardError::NotFound(format!("agent {agent_id}")))
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn find_suitable_agents(
        &self,
        requirements: &AgentRequirements,
    ) -> SwitchboardResult<Vec<AgentCandidate>> {
        let agents = self.agents.read();
        let mut candidates: Vec<AgentCandidate> = agents
            .iter()
            .filter(|a| a.status == AgentStatus::Idle)
            .filter(|a| requirements.capabilities.iter().all(|c| a.has_capability(c)))
            .filter(|a| !requirements.exclude.contains(&a.id))
            .filter(|a| {
                requirements
                    .min_success_rate
                    .map_or(true, |min| a.performance.success_rate >= min)
            })
            .map(|a| AgentCandidate {
                score: a.score(),
                agent: a.clone(),
            })
            .collect();
        // Stable sort keeps registration order among equal scores.
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(candidates)
    }

    async fn get_agent(&self, agent_id: &str) -> SwitchboardResult<Option<Agent>> {
        Ok(self.agents.read().iter().find(|a| a.id == agent_id).cloned())
    }

    async fn update_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> SwitchboardResult<()> {
        self.with_agent(agent_id, |a| a.status = status)
    }

    async fn update_agent_performance(
        &self,
        agent_id: &str,
        performance: AgentPerformance,
    ) -> SwitchboardResult<()> {
        self.with_agent(agent_id, |a| a.performance = performance)
    }

    async fn get_agents_by_capability(&self, capability: &str) -> SwitchboardResult<Vec<Agent>> {
        Ok(self
            .agents
            .read()
            .iter()
            .filter(|a| a.status != AgentStatus::Offline && a.has_capability(capability))
            .cloned()
            .collect())
    }
}
