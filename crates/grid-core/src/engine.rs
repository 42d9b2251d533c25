//! Tick Engine
//!
//! One simulation step, strictly ordered:
//! 1. Move every agent
//! 2. Detect close pairs on the settled positions
//! 3. Run one exchange per pair, concurrently across pairs
//! 4. Mark conversing agents and assemble the report
//!
//! A failed pair is recorded and skipped; it never aborts the tick.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use grid_events::{
    AgentActionRecord, AgentId, AgentStatus, ConversationFailure, GridBounds, ProximityPair,
    TickReport,
};
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coordinator::{ConversationCoordinator, Exchange};
use crate::error::{ConversationError, GridError, RegistryError};
use crate::llm::LanguageModel;
use crate::movement::GridMover;
use crate::proximity::ProximityDetector;
use crate::registry::{Agent, AgentRegistry};
use crate::store::TranscriptBackend;

pub const DEFAULT_CONVERSATION_CONCURRENCY: usize = 4;

/// Caller-side retry policy: a failed generation is retried at most once.
pub const MAX_CONVERSATION_RETRIES: u8 = 1;

/// Per-tick settings for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub bounds: GridBounds,
    /// Exchanges in flight at once within a tick
    pub conversation_concurrency: usize,
    /// Extra attempts for a pair whose generation failed (0 or 1)
    pub conversation_retries: u8,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bounds: GridBounds::default(),
            conversation_concurrency: DEFAULT_CONVERSATION_CONCURRENCY,
            conversation_retries: 0,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), GridError> {
        if !self.bounds.is_valid() {
            return Err(GridError::InvalidConfiguration(format!(
                "grid bounds must be non-negative, got {}",
                self.bounds
            )));
        }
        if self.conversation_concurrency == 0 {
            return Err(GridError::InvalidConfiguration(
                "conversation concurrency must be at least 1".to_string(),
            ));
        }
        if self.conversation_retries > MAX_CONVERSATION_RETRIES {
            return Err(GridError::InvalidConfiguration(format!(
                "conversation retries must be at most {}, got {}",
                MAX_CONVERSATION_RETRIES, self.conversation_retries
            )));
        }
        Ok(())
    }
}

/// Drives ticks over a registry it is handed. Holds no per-tick state.
pub struct TickEngine<M, B> {
    run_id: Uuid,
    settings: EngineSettings,
    mover: GridMover,
    detector: ProximityDetector,
    coordinator: ConversationCoordinator<M, B>,
}

impl<M, B> TickEngine<M, B>
where
    M: LanguageModel,
    B: TranscriptBackend,
{
    pub fn new(
        settings: EngineSettings,
        mover: GridMover,
        detector: ProximityDetector,
        coordinator: ConversationCoordinator<M, B>,
    ) -> Result<Self, GridError> {
        settings.validate()?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            settings,
            mover,
            detector,
            coordinator,
        })
    }

    /// Overrides the generated run id.
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn coordinator(&self) -> &ConversationCoordinator<M, B> {
        &self.coordinator
    }

    /// Runs one tick and returns its report.
    pub async fn step<R: Rng + ?Sized>(
        &self,
        registry: &mut AgentRegistry,
        rng: &mut R,
        tick: u64,
    ) -> TickReport {
        let mut report = TickReport::new(self.run_id, tick, Utc::now());

        // 1. Movement completes for everyone before anything reads positions
        let deltas = match registry.move_all(&self.mover, rng, &self.settings.bounds) {
            Ok(deltas) => deltas,
            Err(e) => {
                warn!("Tick {}: movement skipped: {}", tick, e);
                Vec::new()
            }
        };
        for delta in &deltas {
            report.record(delta.agent_id.clone(), AgentActionRecord::from_delta(delta));
        }

        // 2. Proximity on the settled snapshot
        let agents = registry.all();
        report.proximity = self.detector.detect(&agents);
        for pair in &report.proximity {
            debug!(
                "Agents {} and {} are {} apart",
                pair.first(),
                pair.second(),
                pair.distance
            );
        }

        // 3. One exchange per pair; buffered keeps results in pair order
        let agents = &agents;
        let results: Vec<(ProximityPair, Result<Exchange, ConversationError>)> =
            stream::iter(report.proximity.clone())
                .map(|pair| async move {
                    let result = self.exchange_for(agents, &pair).await;
                    (pair, result)
                })
                .buffered(self.settings.conversation_concurrency)
                .collect()
                .await;

        // 4. Status and records
        for (pair, result) in results {
            match result {
                Ok(exchange) => self.record_exchange(registry, &mut report, exchange),
                Err(e) => {
                    warn!(
                        "Tick {}: conversation between {} and {} skipped: {}",
                        tick,
                        pair.first(),
                        pair.second(),
                        e
                    );
                    report.failures.push(ConversationFailure {
                        participants: pair.participants,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Tick {}: {} agents, {} close pairs, {} agents chatting, {} failed",
            tick,
            registry.len(),
            report.proximity.len(),
            report.chatting_agents(),
            report.failures.len()
        );
        report
    }

    /// The lower identity of the pair opens the conversation.
    async fn exchange_for(
        &self,
        agents: &[Agent],
        pair: &ProximityPair,
    ) -> Result<Exchange, ConversationError> {
        let initiator = lookup(agents, pair.first())?;
        let responder = lookup(agents, pair.second())?;

        let attempts = 1 + u32::from(self.settings.conversation_retries);
        let mut attempt = 1;
        loop {
            match self.coordinator.exchange(initiator, responder).await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    debug!(
                        "Retrying conversation {}-{} after: {}",
                        initiator.id, responder.id, e
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Each participant's record carries the line that participant spoke.
    fn record_exchange(&self, registry: &mut AgentRegistry, report: &mut TickReport, exchange: Exchange) {
        for agent in [exchange.key.first(), exchange.key.second()] {
            if let Err(e) = registry.set_status(agent, AgentStatus::Chatting) {
                warn!("Could not mark {} as chatting: {}", agent, e);
            }
            let Some(partner) = exchange.key.other(agent) else {
                continue;
            };
            let turn = if agent == &exchange.opening.speaker {
                &exchange.opening
            } else {
                &exchange.reply
            };
            report.record(
                agent.clone(),
                AgentActionRecord::Conversed {
                    with: partner.clone(),
                    turn: turn.clone(),
                },
            );
        }
        debug!(
            "Conversation {} now has {} turns",
            exchange.key, exchange.transcript_len
        );
    }
}

fn lookup<'a>(agents: &'a [Agent], id: &AgentId) -> Result<&'a Agent, RegistryError> {
    agents
        .iter()
        .find(|a| &a.id == id)
        .ok_or_else(|| RegistryError::UnknownAgent(id.clone()))
}
