//! Bobbot: a chat persona that answers each burst of channel traffic with a single reply.

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod messaging;
pub mod prompts;
pub mod resolve;
pub mod tier;
pub mod tools;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Platform user identifier (Discord snowflake).
pub type UserId = u64;

/// Platform guild (server) identifier.
pub type GuildId = u64;

/// Platform channel identifier.
pub type ChannelId = u64;

/// Platform message identifier.
pub type MessageId = u64;

/// Immutable snapshot of a message as the host platform reported it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub author_id: UserId,
    pub author_display_name: String,
    pub is_bot_author: bool,
    pub content: String,
    pub channel_id: ChannelId,
    /// None for direct messages.
    pub guild_id: Option<GuildId>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Inbound message event with the addressing hints the trigger policy needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message: ChatMessage,
    /// The bot user is in the message's mention list.
    pub mentions_bot: bool,
    /// The message is a platform reply to one of the bot's messages.
    pub replies_to_bot: bool,
}

impl InboundMessage {
    pub fn is_dm(&self) -> bool {
        self.message.guild_id.is_none()
    }
}

/// A guild (server) the bot belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
}

/// A channel as seen by the bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    /// None for DM channels, which have no name.
    pub name: Option<String>,
    pub guild_id: Option<GuildId>,
}

impl ChannelInfo {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("DM")
    }
}

/// Shared dependency bundle for the inbound router, debouncer and dispatcher.
#[derive(Clone)]
pub struct BotDeps {
    pub platform: Arc<dyn messaging::ChatPlatform>,
    pub llm: Arc<dyn llm::CompletionProvider>,
    pub voice: Arc<dyn voice::VoiceOutput>,
    pub tiers: tier::TierStore,
    pub settings: Arc<config::BotConfig>,
    /// Static persona text the system prompt starts from.
    pub persona: Arc<str>,
}

impl BotDeps {
    /// Whether the user is on the operator allow-list.
    pub fn is_privileged(&self, user_id: UserId) -> bool {
        self.settings.privileged_users.contains(&user_id)
    }
}

impl std::fmt::Debug for BotDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotDeps")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
