//! Chat platform trait.

use crate::error::Result;
use crate::{ChannelId, ChannelInfo, ChatMessage, GuildId, GuildInfo, MessageId, UserId};
use async_trait::async_trait;

/// Discord rejects message bodies longer than this.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Operations the bot core needs from the host platform.
///
/// Object safe so the core can hold `Arc<dyn ChatPlatform>` and tests can
/// swap in a recording fake.
#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
    /// The bot's own user id, once known.
    fn bot_user_id(&self) -> Option<UserId>;

    /// The last `limit` messages in the channel, oldest first.
    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: u8,
    ) -> Result<Vec<ChatMessage>>;

    async fn send_message(&self, channel_id: ChannelId, text: &str) -> Result<()>;

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<()>;

    /// Show a typing indicator in the channel.
    async fn broadcast_typing(&self, channel_id: ChannelId) -> Result<()> {
        let _ = channel_id;
        Ok(())
    }

    /// Look a channel up, cache first, then the platform API.
    /// `Ok(None)` means the platform reports no such channel.
    async fn channel_info(&self, channel_id: ChannelId) -> Result<Option<ChannelInfo>>;

    /// Every guild the bot belongs to.
    async fn list_guilds(&self) -> Result<Vec<GuildInfo>>;

    /// Text channels of a guild, in display order.
    async fn list_text_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelInfo>>;
}

/// Split text into chunks that fit a single platform message, preferring
/// newline then space boundaries.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_chars {
        let hard_end = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(index, _)| index)
            .unwrap_or(remaining.len());
        let window = &remaining[..hard_end];
        let split_at = if remaining[hard_end..].starts_with(char::is_whitespace) {
            hard_end
        } else {
            window
                .rfind('\n')
                .or_else(|| window.rfind(' '))
                .filter(|&index| index > 0)
                .unwrap_or(hard_end)
        };

        chunks.push(remaining[..split_at].trim_end().to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}
