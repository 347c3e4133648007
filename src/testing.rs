//! Recording fakes for the collaborator traits.

use crate::config::BotConfig;
use crate::error::{LlmError, PlatformError, Result};
use crate::llm::{ChatTurn, CompletionProvider};
use crate::messaging::ChatPlatform;
use crate::voice::{VoiceOutput, VoiceSessions};
use crate::{
    BotDeps, ChannelId, ChannelInfo, ChatMessage, GuildId, GuildInfo, MessageId, UserId,
};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub(crate) const BOT_ID: UserId = 900;

pub(crate) fn message(
    id: MessageId,
    author_id: UserId,
    name: &str,
    content: &str,
    channel_id: ChannelId,
    guild_id: Option<GuildId>,
) -> ChatMessage {
    ChatMessage {
        id,
        author_id,
        author_display_name: name.into(),
        is_bot_author: author_id == BOT_ID,
        content: content.into(),
        channel_id,
        guild_id,
        timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + id as i64, 0)
            .unwrap_or_default(),
    }
}

/// In-memory platform that records every outbound call.
#[derive(Default)]
pub(crate) struct FakePlatform {
    pub guilds: Vec<GuildInfo>,
    pub channels: Vec<ChannelInfo>,
    /// Looked up by id only, never listed as text channels.
    pub voice_channels: Vec<ChannelInfo>,
    history: Mutex<HashMap<ChannelId, Vec<ChatMessage>>>,
    sent: Mutex<Vec<(ChannelId, String)>>,
    reactions: Mutex<Vec<(ChannelId, MessageId, String)>>,
    typing: Mutex<Vec<ChannelId>>,
    failing_channels: Mutex<HashSet<ChannelId>>,
    broken_channel_lookup: Mutex<bool>,
}

impl FakePlatform {
    /// Two guilds: "Gotham Central" (1) with #general (10), #memes (11)
    /// and the Lounge voice channel (15), and "Metropolis" (2) with
    /// #daily-planet (20).
    pub fn gotham() -> Self {
        Self {
            guilds: vec![
                GuildInfo {
                    id: 1,
                    name: "Gotham Central".into(),
                },
                GuildInfo {
                    id: 2,
                    name: "Metropolis".into(),
                },
            ],
            channels: vec![
                text_channel(10, "general", 1),
                text_channel(11, "memes", 1),
                text_channel(20, "daily-planet", 2),
            ],
            voice_channels: vec![text_channel(15, "Lounge", 1)],
            ..Default::default()
        }
    }

    pub fn push_history(&self, message: ChatMessage) {
        self.history
            .lock()
            .expect("history lock")
            .entry(message.channel_id)
            .or_default()
            .push(message);
    }

    pub fn fail_sends_to(&self, channel_id: ChannelId) {
        self.failing_channels
            .lock()
            .expect("failing lock")
            .insert(channel_id);
    }

    pub fn break_channel_lookup(&self) {
        *self.broken_channel_lookup.lock().expect("lookup lock") = true;
    }

    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn sent_to(&self, channel_id: ChannelId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == channel_id)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn reactions(&self) -> Vec<(ChannelId, MessageId, String)> {
        self.reactions.lock().expect("reactions lock").clone()
    }

    pub fn typing(&self) -> Vec<ChannelId> {
        self.typing.lock().expect("typing lock").clone()
    }
}

pub(crate) fn text_channel(id: ChannelId, name: &str, guild_id: GuildId) -> ChannelInfo {
    ChannelInfo {
        id,
        name: Some(name.into()),
        guild_id: Some(guild_id),
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    fn bot_user_id(&self) -> Option<UserId> {
        Some(BOT_ID)
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: u8,
    ) -> Result<Vec<ChatMessage>> {
        let history = self.history.lock().expect("history lock");
        let messages = history.get(&channel_id).cloned().unwrap_or_default();
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn send_message(&self, channel_id: ChannelId, text: &str) -> Result<()> {
        if self
            .failing_channels
            .lock()
            .expect("failing lock")
            .contains(&channel_id)
        {
            return Err(PlatformError::Send {
                channel_id,
                reason: "Missing Access".into(),
            }
            .into());
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push((channel_id, text.to_string()));
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<()> {
        self.reactions
            .lock()
            .expect("reactions lock")
            .push((channel_id, message_id, emoji.to_string()));
        Ok(())
    }

    async fn broadcast_typing(&self, channel_id: ChannelId) -> Result<()> {
        self.typing.lock().expect("typing lock").push(channel_id);
        Ok(())
    }

    async fn channel_info(&self, channel_id: ChannelId) -> Result<Option<ChannelInfo>> {
        if *self.broken_channel_lookup.lock().expect("lookup lock") {
            return Err(PlatformError::Request("gateway unavailable".into()).into());
        }
        Ok(self
            .channels
            .iter()
            .chain(&self.voice_channels)
            .find(|channel| channel.id == channel_id)
            .cloned())
    }

    async fn list_guilds(&self) -> Result<Vec<GuildInfo>> {
        Ok(self.guilds.clone())
    }

    async fn list_text_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelInfo>> {
        Ok(self
            .channels
            .iter()
            .filter(|channel| channel.guild_id == Some(guild_id))
            .cloned()
            .collect())
    }
}

/// Completion provider with a canned answer.
pub(crate) struct FakeLlm {
    reply: std::result::Result<String, String>,
    calls: Mutex<Vec<(String, Vec<ChatTurn>)>>,
}

impl FakeLlm {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err("503 Service Unavailable".into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<ChatTurn>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl CompletionProvider for FakeLlm {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
    ) -> std::result::Result<String, LlmError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((system_prompt.to_string(), history.to_vec()));
        self.reply.clone().map_err(LlmError::ProviderRequest)
    }
}

/// Voice output that records what it was asked to say.
#[derive(Default)]
pub(crate) struct FakeVoice {
    sessions: VoiceSessions,
    failing: bool,
    spoken: Mutex<Vec<(GuildId, String)>>,
}

impl FakeVoice {
    /// Already sitting in voice channel 15 of guild 1.
    pub fn connected() -> Self {
        let voice = Self::default();
        voice.sessions.join(1, 15);
        voice
    }

    /// Connected, but every playback fails.
    pub fn broken() -> Self {
        Self {
            failing: true,
            ..Self::connected()
        }
    }

    pub fn spoken(&self) -> Vec<(GuildId, String)> {
        self.spoken.lock().expect("spoken lock").clone()
    }
}

#[async_trait]
impl VoiceOutput for FakeVoice {
    fn is_connected(&self, guild_id: GuildId) -> bool {
        self.sessions.is_connected(guild_id)
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Option<ChannelId>> {
        Ok(self.sessions.join(guild_id, channel_id))
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<Option<ChannelId>> {
        Ok(self.sessions.leave(guild_id))
    }

    async fn speak(&self, guild_id: GuildId, text: &str) -> Result<()> {
        self.spoken
            .lock()
            .expect("spoken lock")
            .push((guild_id, text.to_string()));
        if self.failing {
            return Err(anyhow::anyhow!("tts backend unavailable").into());
        }
        Ok(())
    }
}

/// Dependency bundle over the given fakes and an in-memory tier store.
pub(crate) async fn deps(
    platform: Arc<FakePlatform>,
    llm: Arc<FakeLlm>,
    voice: Arc<FakeVoice>,
    settings: BotConfig,
) -> BotDeps {
    BotDeps {
        platform,
        llm,
        voice,
        tiers: crate::tier::store::tests::memory_store().await,
        settings: Arc::new(settings),
        persona: Arc::from("You are Bob."),
    }
}
