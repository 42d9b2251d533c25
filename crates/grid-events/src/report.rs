//! Tick Report Types
//!
//! Per-tick summaries produced by the engine: who moved, who was close to
//! whom, which conversations happened and which failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::{AgentId, ConversationKey, ConversationTurn, Position};

/// Two agents within the proximity threshold at detection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityPair {
    pub participants: ConversationKey,
    /// Euclidean distance rounded to two decimals
    pub distance: f64,
}

impl ProximityPair {
    pub fn new(participants: ConversationKey, distance: f64) -> Self {
        Self {
            participants,
            distance,
        }
    }

    pub fn first(&self) -> &AgentId {
        self.participants.first()
    }

    pub fn second(&self) -> &AgentId {
        self.participants.second()
    }
}

/// One agent's movement during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDelta {
    pub agent_id: AgentId,
    pub from: Position,
    pub to: Position,
}

impl MovementDelta {
    pub fn moved(&self) -> bool {
        self.from != self.to
    }
}

/// What an agent did during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentActionRecord {
    Moved { from: Position, to: Position },
    Conversed { with: AgentId, turn: ConversationTurn },
    Idle { at: Position },
}

impl AgentActionRecord {
    /// Movement or stay-in-place record derived from a delta.
    pub fn from_delta(delta: &MovementDelta) -> Self {
        if delta.moved() {
            AgentActionRecord::Moved {
                from: delta.from,
                to: delta.to,
            }
        } else {
            AgentActionRecord::Idle { at: delta.to }
        }
    }

    pub fn is_movement(&self) -> bool {
        matches!(
            self,
            AgentActionRecord::Moved { .. } | AgentActionRecord::Idle { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub agent_id: AgentId,
    #[serde(flatten)]
    pub record: AgentActionRecord,
}

/// A pair whose conversation was skipped this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationFailure {
    pub participants: ConversationKey,
    pub error: String,
}

/// Summary of one simulation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub run_id: Uuid,
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub proximity: Vec<ProximityPair>,
    #[serde(default)]
    pub actions: Vec<AgentAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ConversationFailure>,
}

impl TickReport {
    pub fn new(run_id: Uuid, tick: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            run_id,
            tick,
            timestamp,
            proximity: Vec::new(),
            actions: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, agent_id: AgentId, record: AgentActionRecord) {
        self.actions.push(AgentAction { agent_id, record });
    }

    /// All records for one agent, in the order they happened.
    pub fn actions_for<'a>(
        &'a self,
        agent_id: &'a AgentId,
    ) -> impl Iterator<Item = &'a AgentActionRecord> + 'a {
        self.actions
            .iter()
            .filter(move |a| &a.agent_id == agent_id)
            .map(|a| &a.record)
    }

    /// Number of agents that recorded a conversation this tick.
    pub fn chatting_agents(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a.record, AgentActionRecord::Conversed { .. }))
            .map(|a| &a.agent_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Serializes the report to a single JSON line.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
