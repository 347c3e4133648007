//! Language model provider access.

pub mod manager;
pub mod routing;

pub use manager::LlmManager;

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Speaker of a history turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the history sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
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

/// Text generation backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync + 'static {
    /// Generate a reply for `history` under `system_prompt`.
    async fn complete(&self, system_prompt: &str, history: &[ChatTurn]) -> Result<String, LlmError>;
}
