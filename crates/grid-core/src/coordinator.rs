//! Conversation Coordinator
//!
//! Runs one exchange between two nearby agents: the initiator opens with a
//! greeting, the language model answers in the responder's voice, and both
//! turns are merged into the pair's transcript in a single write.

use std::sync::Arc;

use chrono::Utc;
use grid_events::{AgentId, AgentStatus, ConversationKey, ConversationTurn, Transcript};
use tracing::{debug, warn};

use crate::error::{ConversationError, PersistenceError};
use crate::llm::{ChatMessage, LanguageModel};
use crate::registry::{Agent, AgentRegistry};
use crate::store::{ConversationStore, TranscriptBackend};

/// Greeting sent by the initiating agent. `{from}` and `{to}` are replaced
/// by the identities.
pub const DEFAULT_OPENING_MESSAGE: &str =
    "Hello Agent {to}, I noticed you're nearby. How are you doing?";

/// Framing for the responder. `{agent}` is the responder, `{partner}` the
/// initiator.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Agent {agent}, one of a few agents wandering \
     a small grid world. Agent {partner} has just walked up to you. Reply in one or two \
     short, natural sentences.";

pub const DEFAULT_MAX_HISTORY_TURNS: usize = 20;

/// Prompt settings for the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    pub opening_message: String,
    pub system_prompt: String,
    /// Most recent transcript turns replayed to the model
    pub max_history_turns: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            opening_message: DEFAULT_OPENING_MESSAGE.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
        }
    }
}

/// Result of a successful exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub key: ConversationKey,
    pub opening: ConversationTurn,
    pub reply: ConversationTurn,
    /// Turns in the transcript after the merge
    pub transcript_len: usize,
}

pub struct ConversationCoordinator<M, B> {
    model: M,
    store: Arc<ConversationStore<B>>,
    settings: CoordinatorSettings,
}

impl<M, B> ConversationCoordinator<M, B>
where
    M: LanguageModel,
    B: TranscriptBackend,
{
    pub fn new(model: M, store: ConversationStore<B>, settings: CoordinatorSettings) -> Self {
        Self {
            model,
            store: Arc::new(store),
            settings,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn store(&self) -> &ConversationStore<B> {
        &self.store
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Runs an exchange started by `from` and marks both agents Chatting.
    ///
    /// Returns the responder's turn.
    pub async fn converse(
        &self,
        registry: &mut AgentRegistry,
        from: &AgentId,
        to: &AgentId,
    ) -> Result<ConversationTurn, ConversationError> {
        let initiator = registry.get(from)?.clone();
        let responder = registry.get(to)?.clone();

        let exchange = self.exchange(&initiator, &responder).await?;

        registry.set_status(from, AgentStatus::Chatting)?;
        registry.set_status(to, AgentStatus::Chatting)?;
        Ok(exchange.reply)
    }

    /// Generates and persists one exchange without touching the registry.
    ///
    /// Nothing is written unless the model call succeeds.
    pub async fn exchange(
        &self,
        initiator: &Agent,
        responder: &Agent,
    ) -> Result<Exchange, ConversationError> {
        let key = ConversationKey::new(initiator.id.clone(), responder.id.clone())?;

        let history = match self.load_history(&key).await {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!("Treating history for {} as empty: {}", key, e);
                Transcript::empty(key.clone())
            }
        };

        let opening_text = self.render_opening(initiator, responder);
        let opening = ConversationTurn::new(
            initiator.id.clone(),
            responder.id.clone(),
            opening_text,
            Utc::now(),
        );

        let prompt = self.build_prompt(&history, initiator, responder, &opening.message);
        debug!(
            "Prompting {} for {} with {} messages",
            self.model.model(),
            key,
            prompt.len()
        );
        let reply_text = self.model.generate(&prompt).await?;

        let reply = ConversationTurn::new(
            responder.id.clone(),
            initiator.id.clone(),
            reply_text,
            Utc::now(),
        );

        let merged = self
            .append_turns(&key, vec![opening.clone(), reply.clone()])
            .await?;

        Ok(Exchange {
            key,
            opening,
            reply,
            transcript_len: merged.len(),
        })
    }

    // Transcript I/O is blocking; keep it off the async workers so other
    // exchanges in the tick keep running.
    async fn load_history(&self, key: &ConversationKey) -> Result<Transcript, PersistenceError> {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        tokio::task::spawn_blocking(move || store.load(&key))
            .await
            .map_err(|e| PersistenceError::Backend(format!("transcript read task failed: {}", e)))?
    }

    async fn append_turns(
        &self,
        key: &ConversationKey,
        turns: Vec<ConversationTurn>,
    ) -> Result<Transcript, PersistenceError> {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        tokio::task::spawn_blocking(move || store.append(&key, turns))
            .await
            .map_err(|e| PersistenceError::Backend(format!("transcript write task failed: {}", e)))?
    }

    fn render_opening(&self, initiator: &Agent, responder: &Agent) -> String {
        self.settings
            .opening_message
            .replace("{from}", initiator.id.as_str())
            .replace("{to}", responder.id.as_str())
    }

    /// System framing, replayed history from the responder's point of view,
    /// then the new opening line.
    pub fn build_prompt(
        &self,
        history: &Transcript,
        initiator: &Agent,
        responder: &Agent,
        opening: &str,
    ) -> Vec<ChatMessage> {
        let mut framing = self
            .settings
            .system_prompt
            .replace("{agent}", responder.id.as_str())
            .replace("{partner}", initiator.id.as_str());
        if let Some(persona) = &responder.persona {
            framing.push_str("\nYour personality: ");
            framing.push_str(persona);
        }

        let recent = history.recent(self.settings.max_history_turns);
        let mut prompt = Vec::with_capacity(recent.len() + 2);
        prompt.push(ChatMessage::system(framing));
        for turn in recent {
            if turn.speaker == responder.id {
                prompt.push(ChatMessage::assistant(turn.message.clone()));
            } else {
                prompt.push(ChatMessage::user(turn.message.clone()));
            }
        }
        prompt.push(ChatMessage::user(opening));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::llm::{Role, ScriptedModel};
    use crate::store::MemoryBackend;
    use grid_events::fixtures::{sample_key, sample_transcript};
    use grid_events::Position;

    fn coordinator(model: ScriptedModel) -> ConversationCoordinator<ScriptedModel, MemoryBackend> {
        ConversationCoordinator::new(
            model,
            ConversationStore::in_memory(),
            CoordinatorSettings::default(),
        )
    }

    fn registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry.register("william", Position::new(5, 5)).unwrap();
        registry
            .insert(Agent::new("emma", Position::new(6, 6)).with_persona("Loves art."))
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_converse_persists_and_marks_chatting() {
        let coordinator = coordinator(ScriptedModel::with_replies(["Lovely day!"]));
        let mut registry = registry();
        let william = AgentId::from("william");
        let emma = AgentId::from("emma");

        let turn = coordinator.converse(&mut registry, &william, &emma).await.unwrap();
        assert_eq!(turn.speaker, emma);
        assert_eq!(turn.recipient, william);
        assert_eq!(turn.message, "Lovely day!");

        let transcript = coordinator.store().load(&sample_key()).unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.turns[0].speaker, william);
        assert_eq!(
            transcript.turns[0].message,
            "Hello Agent emma, I noticed you're nearby. How are you doing?"
        );
        assert_eq!(transcript.turns[1], turn);
        assert_eq!(transcript.last_updated, Some(turn.timestamp));

        assert_eq!(registry.get(&william).unwrap().status, AgentStatus::Chatting);
        assert_eq!(registry.get(&emma).unwrap().status, AgentStatus::Chatting);
    }

    #[tokio::test]
    async fn test_either_direction_shares_transcript() {
        let coordinator = coordinator(ScriptedModel::new());
        let mut registry = registry();
        let william = AgentId::from("william");
        let emma = AgentId::from("emma");

        coordinator.converse(&mut registry, &william, &emma).await.unwrap();
        coordinator.converse(&mut registry, &emma, &william).await.unwrap();

        let keys = coordinator.store().keys().unwrap();
        assert_eq!(keys, vec![sample_key()]);
        let transcript = coordinator.store().load(&sample_key()).unwrap();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript.turns[2].speaker, emma);
    }

    #[tokio::test]
    async fn test_generation_failure_writes_nothing() {
        let coordinator = coordinator(ScriptedModel::new().fail_on("Agent emma"));
        let mut registry = registry();
        let william = AgentId::from("william");
        let emma = AgentId::from("emma");

        let err = coordinator
            .converse(&mut registry, &william, &emma)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConversationError::Generation(GenerationError::Provider(_))
        ));
        assert!(err.is_retryable());
        assert!(coordinator.store().load(&sample_key()).unwrap().is_empty());
        assert_eq!(registry.get(&william).unwrap().status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let coordinator = coordinator(ScriptedModel::new());
        let mut registry = registry();
        let err = coordinator
            .converse(&mut registry, &AgentId::from("william"), &AgentId::from("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::Registry(_)));
        assert!(!err.is_retryable());
        assert_eq!(coordinator.model().calls(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_history_is_reset() {
        let coordinator = coordinator(ScriptedModel::new());
        coordinator
            .store()
            .backend()
            .replace(&sample_key(), b"garbage")
            .unwrap();
        let mut registry = registry();

        coordinator
            .converse(&mut registry, &AgentId::from("emma"), &AgentId::from("william"))
            .await
            .unwrap();
        assert_eq!(coordinator.store().load(&sample_key()).unwrap().len(), 2);
    }

    /// Holds the first `parties` reads until all of them have arrived.
    struct RendezvousBackend {
        inner: MemoryBackend,
        barrier: std::sync::Barrier,
        waiting: std::sync::atomic::AtomicUsize,
    }

    impl RendezvousBackend {
        fn new(parties: usize) -> Self {
            Self {
                inner: MemoryBackend::new(),
                barrier: std::sync::Barrier::new(parties),
                waiting: std::sync::atomic::AtomicUsize::new(parties),
            }
        }
    }

    impl TranscriptBackend for RendezvousBackend {
        fn read(&self, key: &ConversationKey) -> Result<Option<Vec<u8>>, PersistenceError> {
            let gated = self
                .waiting
                .fetch_update(
                    std::sync::atomic::Ordering::SeqCst,
                    std::sync::atomic::Ordering::SeqCst,
                    |n| n.checked_sub(1),
                )
                .is_ok();
            if gated {
                self.barrier.wait();
            }
            self.inner.read(key)
        }

        fn replace(&self, key: &ConversationKey, bytes: &[u8]) -> Result<(), PersistenceError> {
            self.inner.replace(key, bytes)
        }

        fn keys(&self) -> Result<Vec<ConversationKey>, PersistenceError> {
            self.inner.keys()
        }
    }

    #[tokio::test]
    async fn test_blocking_reads_do_not_stall_other_exchanges() {
        // Single-threaded runtime: both reads can only meet at the barrier
        // if neither runs on the runtime thread.
        let coordinator = ConversationCoordinator::new(
            ScriptedModel::new(),
            ConversationStore::new(RendezvousBackend::new(2)),
            CoordinatorSettings::default(),
        );
        let william = Agent::new("william", Position::new(5, 5));
        let emma = Agent::new("emma", Position::new(6, 6));
        let olivia = Agent::new("olivia", Position::new(6, 5));

        let (first, second) = tokio::join!(
            coordinator.exchange(&emma, &william),
            coordinator.exchange(&olivia, &william),
        );

        assert_eq!(first.unwrap().transcript_len, 2);
        assert_eq!(second.unwrap().transcript_len, 2);
        assert_eq!(coordinator.store().keys().unwrap().len(), 2);
    }

    #[test]
    fn test_prompt_roles_follow_responder() {
        let coordinator = coordinator(ScriptedModel::new());
        let registry = registry();
        let william = registry.get(&AgentId::from("william")).unwrap();
        let emma = registry.get(&AgentId::from("emma")).unwrap();

        // In the fixture emma opens and william replies; now william opens
        // and emma responds, so emma's old lines are the assistant's.
        let prompt = coordinator.build_prompt(&sample_transcript(), william, emma, "Hi emma");

        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].role, Role::System);
        assert!(prompt[0].content.contains("You are Agent emma"));
        assert!(prompt[0].content.contains("Agent william has just walked up"));
        assert!(prompt[0].content.contains("Loves art."));
        assert_eq!(prompt[1].role, Role::Assistant);
        assert_eq!(prompt[2].role, Role::User);
        assert_eq!(prompt[3], ChatMessage::user("Hi emma"));
    }

    #[test]
    fn test_prompt_history_is_capped() {
        let mut coordinator = coordinator(ScriptedModel::new());
        coordinator.settings.max_history_turns = 1;
        let registry = registry();
        let william = registry.get(&AgentId::from("william")).unwrap();
        let emma = registry.get(&AgentId::from("emma")).unwrap();

        let prompt = coordinator.build_prompt(&sample_transcript(), william, emma, "Hi");
        assert_eq!(prompt.len(), 3);
        assert_eq!(prompt[1].content, "Doing well, thanks for asking!");
    }
}
