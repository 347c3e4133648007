//! Discord adapter using serenity.

use crate::agent::InboundRouter;
use crate::error::{PlatformError, Result};
use crate::messaging::traits::{ChatPlatform, MAX_MESSAGE_CHARS, split_message};
use crate::{ChannelId, ChannelInfo, ChatMessage, GuildId, GuildInfo, InboundMessage, MessageId, UserId};

use async_trait::async_trait;
use serenity::all::{
    Cache, Channel, ChannelType, Context, EventHandler, GatewayIntents, GetMessages, Http, Message,
    Ready,
};
use serenity::model::channel::ReactionType;
use serenity::model::id::{ChannelId as DiscordChannelId, MessageId as DiscordMessageId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Chat platform backed by a serenity gateway connection.
///
/// The HTTP client and cache become available once the gateway reports
/// ready; calls made before that fail with [`PlatformError::Request`].
#[derive(Default)]
pub struct DiscordPlatform {
    clients: OnceLock<(Arc<Http>, Arc<Cache>)>,
    bot_user_id: AtomicU64,
}

impl std::fmt::Debug for DiscordPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordPlatform")
            .field("connected", &self.clients.get().is_some())
            .field("bot_user_id", &self.bot_user_id())
            .finish()
    }
}

impl DiscordPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway intents the bot needs.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_VOICE_STATES
    }

    fn attach(&self, ctx: &Context, bot_user_id: UserId) {
        self.bot_user_id.store(bot_user_id, Ordering::Release);
        if self
            .clients
            .set((ctx.http.clone(), ctx.cache.clone()))
            .is_err()
        {
            tracing::debug!("discord clients already attached, keeping the first");
        }
    }

    fn http(&self) -> Result<&Arc<Http>> {
        self.clients
            .get()
            .map(|(http, _)| http)
            .ok_or_else(|| PlatformError::Request("discord client is not ready".into()).into())
    }

    fn cache(&self) -> Result<&Arc<Cache>> {
        self.clients
            .get()
            .map(|(_, cache)| cache)
            .ok_or_else(|| PlatformError::Request("discord client is not ready".into()).into())
    }

    /// Convert a serenity message into the platform-neutral snapshot.
    fn to_chat_message(&self, message: &Message) -> ChatMessage {
        ChatMessage {
            id: message.id.get(),
            author_id: message.author.id.get(),
            author_display_name: display_name(
                message.member.as_ref().and_then(|member| member.nick.as_deref()),
                message.author.global_name.as_deref(),
                &message.author.name,
            ),
            is_bot_author: message.author.bot,
            content: message.content.clone(),
            channel_id: message.channel_id.get(),
            guild_id: message.guild_id.map(|id| id.get()),
            timestamp: chrono::DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0)
                .unwrap_or_default(),
        }
    }

    fn to_inbound(&self, message: &Message) -> InboundMessage {
        let bot_id = self.bot_user_id();
        let is_bot = |id: u64| bot_id == Some(id);

        InboundMessage {
            message: self.to_chat_message(message),
            mentions_bot: message.mentions.iter().any(|user| is_bot(user.id.get())),
            replies_to_bot: message
                .referenced_message
                .as_ref()
                .is_some_and(|reply| is_bot(reply.author.id.get())),
        }
    }
}

/// Guild nickname, then global display name, then username.
fn display_name(nick: Option<&str>, global_name: Option<&str>, username: &str) -> String {
    nick.or(global_name).unwrap_or(username).to_string()
}

/// Serenity ids must be non-zero.
fn discord_channel(channel_id: ChannelId) -> Result<DiscordChannelId> {
    if channel_id == 0 {
        return Err(PlatformError::ChannelNotFound { id: channel_id }.into());
    }
    Ok(DiscordChannelId::new(channel_id))
}

fn is_not_found(error: &serenity::Error) -> bool {
    match error {
        serenity::Error::Http(http_error) => {
            http_error.status_code().map(|status| status.as_u16()) == Some(404)
        }
        _ => false,
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    fn bot_user_id(&self) -> Option<UserId> {
        match self.bot_user_id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: u8,
    ) -> Result<Vec<ChatMessage>> {
        let http = self.http()?;
        let mut messages = discord_channel(channel_id)?
            .messages(&**http, GetMessages::new().limit(limit))
            .await
            .map_err(|error| PlatformError::Request(format!("failed to fetch history: {error}")))?;

        // Discord returns newest first.
        messages.reverse();
        Ok(messages
            .iter()
            .map(|message| self.to_chat_message(message))
            .collect())
    }

    async fn send_message(&self, channel_id: ChannelId, text: &str) -> Result<()> {
        let http = self.http()?;
        let channel = discord_channel(channel_id)?;

        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            channel
                .say(&**http, chunk)
                .await
                .map_err(|error| PlatformError::Send {
                    channel_id,
                    reason: error.to_string(),
                })?;
        }
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<()> {
        let http = self.http()?;
        if message_id == 0 {
            return Err(PlatformError::Request("message id must be non-zero".into()).into());
        }

        http.create_reaction(
            discord_channel(channel_id)?,
            DiscordMessageId::new(message_id),
            &ReactionType::Unicode(emoji.to_string()),
        )
        .await
        .map_err(|error| PlatformError::Request(format!("failed to add reaction: {error}")))?;
        Ok(())
    }

    async fn broadcast_typing(&self, channel_id: ChannelId) -> Result<()> {
        let http = self.http()?;
        discord_channel(channel_id)?
            .broadcast_typing(&**http)
            .await
            .map_err(|error| PlatformError::Request(error.to_string()))?;
        Ok(())
    }

    async fn channel_info(&self, channel_id: ChannelId) -> Result<Option<ChannelInfo>> {
        if channel_id == 0 {
            return Ok(None);
        }
        let http = self.http()?;
        let cache = self.cache()?;

        // Cache first, then the REST API.
        let channel = match DiscordChannelId::new(channel_id)
            .to_channel((cache, &**http))
            .await
        {
            Ok(channel) => channel,
            Err(error) if is_not_found(&error) => return Ok(None),
            Err(error) => {
                return Err(PlatformError::Request(format!("channel lookup failed: {error}")).into());
            }
        };

        Ok(Some(match channel {
            Channel::Guild(guild_channel) => ChannelInfo {
                id: channel_id,
                name: Some(guild_channel.name),
                guild_id: Some(guild_channel.guild_id.get()),
            },
            // Direct messages have no name or guild.
            _ => ChannelInfo {
                id: channel_id,
                name: None,
                guild_id: None,
            },
        }))
    }

    async fn list_guilds(&self) -> Result<Vec<GuildInfo>> {
        let cache = self.cache()?;
        let mut guilds: Vec<GuildInfo> = cache
            .guilds()
            .into_iter()
            .filter_map(|guild_id| {
                cache.guild(guild_id).map(|guild| GuildInfo {
                    id: guild_id.get(),
                    name: guild.name.clone(),
                })
            })
            .collect();
        guilds.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(guilds)
    }

    async fn list_text_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelInfo>> {
        let cache = self.cache()?;
        if guild_id == 0 {
            return Err(PlatformError::GuildNotFound { id: guild_id }.into());
        }

        let guild = cache
            .guild(serenity::model::id::GuildId::new(guild_id))
            .ok_or(PlatformError::GuildNotFound { id: guild_id })?;

        let mut channels: Vec<_> = guild
            .channels
            .values()
            .filter(|channel| channel.kind == ChannelType::Text)
            .map(|channel| (channel.position, channel.id.get(), channel.name.clone()))
            .collect();
        drop(guild);

        channels.sort();
        Ok(channels
            .into_iter()
            .map(|(_, id, name)| ChannelInfo {
                id,
                name: Some(name),
                guild_id: Some(guild_id),
            })
            .collect())
    }
}

/// Serenity event handler feeding the inbound router.
pub struct DiscordHandler {
    platform: Arc<DiscordPlatform>,
    router: Arc<InboundRouter>,
}

impl DiscordHandler {
    pub fn new(platform: Arc<DiscordPlatform>, router: Arc<InboundRouter>) -> Self {
        Self { platform, router }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.platform.attach(&ctx, ready.user.id.get());
        tracing::info!(
            user = %ready.user.name,
            user_id = ready.user.id.get(),
            guilds = ready.guilds.len(),
            "discord connected"
        );
    }

    async fn message(&self, _ctx: Context, message: Message) {
        let inbound = self.platform.to_inbound(&message);
        let decision = self.router.handle(inbound).await;
        tracing::trace!(channel_id = message.channel_id.get(), ?decision, "message routed");
    }
}
