//! Conversation Types
//!
//! Transcripts are addressed by a canonical, unordered pair of agents so that
//! a conversation started by either side lands in the same history.
//!
//! # Example
//!
//! ```
//! use grid_events::{AgentId, ConversationKey};
//!
//! let ab = ConversationKey::new(AgentId::from("b"), AgentId::from("a")).unwrap();
//! let ba = ConversationKey::new(AgentId::from("a"), AgentId::from("b")).unwrap();
//! assert_eq!(ab, ba);
//! assert_eq!(ab.first().as_str(), "a");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::AgentId;

/// Canonical unordered pair of two distinct agents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    first: AgentId,
    second: AgentId,
}

impl ConversationKey {
    /// Builds the key for two agents, in either order.
    pub fn new(a: AgentId, b: AgentId) -> Result<Self, PairError> {
        if a == b {
            return Err(PairError::SameAgent(a));
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { first, second })
    }

    /// The lower of the two identities.
    pub fn first(&self) -> &AgentId {
        &self.first
    }

    /// The higher of the two identities.
    pub fn second(&self) -> &AgentId {
        &self.second
    }

    pub fn involves(&self, agent_id: &AgentId) -> bool {
        &self.first == agent_id || &self.second == agent_id
    }

    /// Returns the participant that is not `agent_id`.
    pub fn other(&self, agent_id: &AgentId) -> Option<&AgentId> {
        if &self.first == agent_id {
            Some(&self.second)
        } else if &self.second == agent_id {
            Some(&self.first)
        } else {
            None
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.first, self.second)
    }
}

// Serialized as a two-element array; deserialization re-canonicalizes.
impl Serialize for ConversationKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        [&self.first, &self.second].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConversationKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let [a, b] = <[AgentId; 2]>::deserialize(deserializer)?;
        ConversationKey::new(a, b).map_err(serde::de::Error::custom)
    }
}

/// Error building a conversation key.
#[derive(Debug, Clone, PartialEq)]
pub enum PairError {
    SameAgent(AgentId),
}

impl fmt::Display for PairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairError::SameAgent(id) => {
                write!(f, "a conversation needs two distinct agents, got '{}' twice", id)
            }
        }
    }
}

impl std::error::Error for PairError {}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: AgentId,
    pub recipient: AgentId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(
        speaker: AgentId,
        recipient: AgentId,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            speaker,
            recipient,
            message: message.into(),
            timestamp,
        }
    }
}

/// Full ordered history for one canonical pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub participants: ConversationKey,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
}

impl Transcript {
    /// A transcript with no turns yet.
    pub fn empty(participants: ConversationKey) -> Self {
        Self {
            participants,
            last_updated: None,
            turns: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Appends turns in order and moves `last_updated` to the last appended
    /// turn. Appending nothing leaves the transcript untouched.
    pub fn extend<I>(&mut self, turns: I)
    where
        I: IntoIterator<Item = ConversationTurn>,
    {
        for turn in turns {
            self.last_updated = Some(turn.timestamp);
            self.turns.push(turn);
        }
    }

    /// The most recent `limit` turns, oldest first.
    pub fn recent(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }
}
