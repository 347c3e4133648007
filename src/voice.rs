//! Voice connections and spoken output of replies.

use crate::error::Result;
use crate::{ChannelId, GuildId};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Voice-channel presence and text-to-speech playback per guild.
///
/// Speaking is best effort: callers log failures and carry on with the text
/// reply.
#[async_trait]
pub trait VoiceOutput: Send + Sync + 'static {
    /// Whether the bot currently holds a voice connection in the guild.
    fn is_connected(&self, guild_id: GuildId) -> bool;

    /// Join `channel_id`, moving out of any other channel in the guild.
    /// Returns the channel that was left by the move, if any.
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Option<ChannelId>>;

    /// Leave the guild's voice channel. Returns the channel that was left.
    async fn disconnect(&self, guild_id: GuildId) -> Result<Option<ChannelId>>;

    async fn speak(&self, guild_id: GuildId, text: &str) -> Result<()>;
}

/// Tracks one voice session per guild.
///
/// No audio transport is attached, so speech is logged and dropped.
#[derive(Debug, Default)]
pub struct VoiceSessions {
    sessions: Mutex<HashMap<GuildId, ChannelId>>,
}

impl VoiceSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel the bot sits in for `guild_id`.
    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild_id)
            .copied()
    }

    pub(crate) fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<ChannelId> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guild_id, channel_id)
            .filter(|previous| *previous != channel_id)
    }

    pub(crate) fn leave(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&guild_id)
    }
}

#[async_trait]
impl VoiceOutput for VoiceSessions {
    fn is_connected(&self, guild_id: GuildId) -> bool {
        self.channel(guild_id).is_some()
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Option<ChannelId>> {
        let previous = self.join(guild_id, channel_id);
        match previous {
            Some(from) => tracing::info!(guild_id, from, to = channel_id, "moved voice channel"),
            None => tracing::info!(guild_id, channel_id, "joined voice channel"),
        }
        Ok(previous)
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<Option<ChannelId>> {
        let left = self.leave(guild_id);
        if let Some(channel_id) = left {
            tracing::info!(guild_id, channel_id, "left voice channel");
        }
        Ok(left)
    }

    async fn speak(&self, guild_id: GuildId, text: &str) -> Result<()> {
        tracing::debug!(
            guild_id,
            channel_id = self.channel(guild_id),
            text_len = text.len(),
            "no audio transport attached, dropping speech"
        );
        Ok(())
    }
}
