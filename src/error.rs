//! Top-level error types for Bobbot.

use crate::{ChannelId, GuildId};
use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    InvalidTier(#[from] crate::tier::InvalidTier),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),
}

/// Database connection and operation errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to connect to SQLite: {0}")]
    SqliteConnect(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// LLM provider errors. Recovered locally by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider request failed: {0}")]
    ProviderRequest(String),

    #[error("completion failed: {0}")]
    CompletionFailed(String),

    #[error("provider returned an empty response")]
    EmptyResponse,
}

/// Chat platform errors. Sends that fail here are reported inline to users.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("channel {id} not found")]
    ChannelNotFound { id: ChannelId },

    #[error("guild {id} not found")]
    GuildNotFound { id: GuildId },

    #[error("failed to send to channel {channel_id}: {reason}")]
    Send { channel_id: ChannelId, reason: String },

    #[error("platform request failed: {0}")]
    Request(String),
}

/// Name resolution failures for tool directives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("no server looking like '{query}'")]
    GuildNotFound { query: String },

    #[error("no channel looking like '{query}' in '{guild}'")]
    ChannelNotFound { guild: String, query: String },
}
