//! Deterministic offline model.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ChatMessage, LanguageModel, Role};
use crate::error::GenerationError;

/// Replies from a fixed script, for offline runs and tests.
///
/// With no script it acknowledges the last user message. A failure marker
/// makes every prompt containing that text fail with a provider error.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Vec<String>,
    fail_marker: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cycles through `replies` in order.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Fails any prompt whose messages contain `marker`.
    pub fn fail_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Number of `generate` calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, history: &[ChatMessage]) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(marker) = &self.fail_marker {
            if history.iter().any(|m| m.content.contains(marker.as_str())) {
                return Err(GenerationError::Provider(format!(
                    "scripted failure on '{}'",
                    marker
                )));
            }
        }

        if !self.replies.is_empty() {
            return Ok(self.replies[n % self.replies.len()].clone());
        }

        let heard = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("nothing");
        Ok(format!("Nice to run into you. You said: \"{}\"", heard))
    }
}
