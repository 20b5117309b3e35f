use crate::events::{OrchestratorBus, OrchestratorEvent};
use crate::ids::AgentId;
use crate::mirror::{StoreMirror, AGENTS_TABLE};
use crate::profiles::default_agents;
use crate::types::{Agent, AgentStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Known agents keyed by id. Agents are never removed.
pub struct AgentRegistry {
    agents: RwLock<HashMap<AgentId, Agent>>,
    events: OrchestratorBus,
    mirror: StoreMirror,
}

impl AgentRegistry {
    /// Registry seeded with [`default_agents`]. Seeding is neither persisted
    /// nor announced.
    pub fn new(events: OrchestratorBus, mirror: StoreMirror) -> Self {
        let agents = default_agents()
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        Self {
            agents: RwLock::new(agents),
            events,
            mirror,
        }
    }

    /// Insert or overwrite an agent, persist it and announce it.
    pub async fn register_agent(&self, agent: Agent) {
        info!(agent_id = %agent.id, kind = %agent.kind, "registering agent");
        self.agents
            .write()
            .await
            .insert(agent.id.clone(), agent.clone());
        self.mirror
            .upsert(AGENTS_TABLE, agent.id.as_str(), &agent)
            .await;
        self.events.publish(OrchestratorEvent::AgentRegistered(agent));
    }

    pub async fn get_agent(&self, id: &AgentId) -> Option<Agent> {
        self.agents.read().await.get(id).cloned()
    }

    /// All agents, ordered by id.
    pub async fn list_agents(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// The idle agent with the best suitability score among those declaring
    /// every required capability. Ties go to the smaller id.
    pub async fn best_idle_match(&self, required: &[&str]) -> Option<Agent> {
        let agents = self.agents.read().await;
        let mut candidates: Vec<&Agent> = agents
            .values()
            .filter(|a| a.status == AgentStatus::Idle && a.has_capabilities(required))
            .collect();
        candidates.sort_by(|a, b| {
            b.suitability()
                .total_cmp(&a.suitability())
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.first().map(|a| (*a).clone())
    }

    /// Returns false when the agent is unknown.
    pub async fn set_status(&self, id: &AgentId, status: AgentStatus) -> bool {
        match self.agents.write().await.get_mut(id) {
            Some(agent) => {
                debug!(agent_id = %id, ?status, "agent status");
                agent.status = status;
                true
            }
            None => false,
        }
    }
}
