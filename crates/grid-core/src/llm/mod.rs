//! Language model seam.
//!
//! The engine only needs `generate(history) -> text`. Provider wire formats
//! live in the adapters:
//!
//! - [`OpenAiChat`]: OpenAI-compatible chat-completions endpoint
//! - [`ScriptedModel`]: deterministic offline replies

mod openai;
mod scripted;

pub use openai::{OpenAiChat, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use scripted::ScriptedModel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GenerationError;

/// Role of a message in the prompt history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed framing
    System,
    /// The other side of the conversation
    User,
    /// The agent the model speaks for
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Something that turns a prompt history into the next message.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model name, for logs.
    fn model(&self) -> &str;

    /// Generates the next message for `history`.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] on timeout, transport or provider failure.
    async fn generate(&self, history: &[ChatMessage]) -> Result<String, GenerationError>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    fn model(&self) -> &str {
        (**self).model()
    }

    async fn generate(&self, history: &[ChatMessage]) -> Result<String, GenerationError> {
        (**self).generate(history).await
    }
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Box<T> {
    fn model(&self) -> &str {
        (**self).model()
    }

    async fn generate(&self, history: &[ChatMessage]) -> Result<String, GenerationError> {
        (**self).generate(history).await
    }
}
