//! Agent Registry
//!
//! Owns every live agent. Other components read snapshots or go through the
//! registry's methods to change an agent; nothing else holds a mutable agent.

use std::collections::BTreeMap;

use grid_events::{AgentId, AgentStatus, GridBounds, MovementDelta, Position};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RegistryError;
use crate::movement::GridMover;

/// A simulated agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub position: Position,
    pub status: AgentStatus,
    /// Short personality line used to frame conversations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, position: Position) -> Self {
        Self {
            id: id.into(),
            position,
            status: AgentStatus::Idle,
            persona: None,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }
}

/// Identities double as transcript file names, so keep them path-safe.
fn is_valid_identity(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// The set of live agents, keyed and ordered by identity.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentId, Agent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new idle agent at `position`.
    pub fn register(
        &mut self,
        id: impl Into<AgentId>,
        position: Position,
    ) -> Result<&Agent, RegistryError> {
        self.insert(Agent::new(id, position))
    }

    /// Registers a fully built agent.
    pub fn insert(&mut self, agent: Agent) -> Result<&Agent, RegistryError> {
        if !is_valid_identity(agent.id.as_str()) {
            return Err(RegistryError::InvalidIdentity(agent.id.0));
        }
        if self.agents.contains_key(&agent.id) {
            return Err(RegistryError::DuplicateIdentity(agent.id));
        }
        let id = agent.id.clone();
        Ok(self.agents.entry(id).or_insert(agent))
    }

    pub fn unregister(&mut self, id: &AgentId) -> Result<Agent, RegistryError> {
        self.agents
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownAgent(id.clone()))
    }

    pub fn get(&self, id: &AgentId) -> Result<&Agent, RegistryError> {
        self.agents
            .get(id)
            .ok_or_else(|| RegistryError::UnknownAgent(id.clone()))
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    /// Snapshot of all agents, ordered by identity.
    pub fn all(&self) -> Vec<Agent> {
        self.agents.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Whether any agent currently occupies `position`.
    pub fn is_occupied(&self, position: &Position) -> bool {
        self.agents.values().any(|a| &a.position == position)
    }

    pub fn set_status(&mut self, id: &AgentId, status: AgentStatus) -> Result<(), RegistryError> {
        let agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownAgent(id.clone()))?;
        agent.status = status;
        Ok(())
    }

    /// Moves every agent one random step and marks it as Moving.
    ///
    /// Bounds are checked once up front, so either every agent moves or none
    /// does. Agents that somehow sit outside the bounds are left in place.
    pub fn move_all<R: Rng + ?Sized>(
        &mut self,
        mover: &GridMover,
        rng: &mut R,
        bounds: &GridBounds,
    ) -> Result<Vec<MovementDelta>, RegistryError> {
        GridMover::validate(&Position::ORIGIN, bounds)?;

        let mut deltas = Vec::with_capacity(self.agents.len());
        for agent in self.agents.values_mut() {
            let from = agent.position;
            let to = match mover.propose(rng, from, bounds) {
                Ok(next) => next,
                Err(e) => {
                    debug!("Agent {} cannot move: {}", agent.id, e);
                    from
                }
            };
            agent.position = to;
            agent.status = AgentStatus::Moving;
            debug!("Agent {} moved from {} to {}", agent.id, from, to);
            deltas.push(MovementDelta {
                agent_id: agent.id.clone(),
                from,
                to,
            });
        }
        Ok(deltas)
    }
}
