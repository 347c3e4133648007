//! Per-burst reply pipeline.

use crate::agent::debounce::BurstHandler;
use crate::agent::inbound::ConversationActivity;
use crate::error::Result;
use crate::llm::ChatTurn;
use crate::prompts::{EnvironmentContext, build_system_prompt};
use crate::resolve::NameResolver;
use crate::tier::Tier;
use crate::tools::{DirectiveResult, execute_directive, parse_directive};
use crate::{BotDeps, ChannelId, ChatMessage, GuildId, UserId};

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

/// Sent in place of a reply when the model provider fails.
pub const FALLBACK_REPLY: &str = "Grr... my brain hurts. (API Error)";

/// The model writes this to decline to answer.
pub const SILENCE_TOKEN: &str = "[SILENCE]";

static SPEAKER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:bob|response):\s*").expect("hardcoded regex"));

/// How a burst was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The history held no message from anyone but the bot.
    NoPrimaryUser,
    /// The model chose silence, or produced nothing to say.
    Silenced,
    /// `text` was sent to the channel.
    Replied {
        text: String,
        directive: Option<DirectiveResult>,
    },
    /// A directive ran and no further text was sent, either because it
    /// already delivered into this channel or nothing else remained.
    Suppressed { directive: DirectiveResult },
}

/// Fetches history, builds the prompt, calls the model, and delivers the
/// reply with any embedded directive.
pub struct ResponseDispatcher {
    deps: BotDeps,
    resolver: NameResolver,
    activity: ConversationActivity,
}

impl std::fmt::Debug for ResponseDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseDispatcher")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl ResponseDispatcher {
    pub fn new(deps: BotDeps, activity: ConversationActivity) -> Self {
        let resolver = NameResolver::new(deps.settings.fuzzy_threshold);
        Self {
            deps,
            resolver,
            activity,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn run(&self, channel_id: ChannelId) -> Result<DispatchOutcome> {
        let platform = &self.deps.platform;
        let history = platform
            .fetch_recent_messages(channel_id, self.deps.settings.history_limit)
            .await?;

        let bot_id = platform.bot_user_id();
        let Some(primary) = history
            .iter()
            .rev()
            .find(|message| Some(message.author_id) != bot_id)
        else {
            tracing::debug!("no user message in history");
            return Ok(DispatchOutcome::NoPrimaryUser);
        };

        let tier = self.tier_for(primary.author_id).await;
        let guild_id = primary.guild_id;
        let environment = self.environment(channel_id, guild_id).await?;
        let system_prompt = build_system_prompt(&self.deps.persona, tier, &environment);
        let turns = history_turns(&history);

        tracing::info!(
            channel = %environment.channel_name,
            primary_user = %primary.author_display_name,
            %tier,
            messages = turns.len(),
            "processing burst"
        );

        if let Err(error) = platform.broadcast_typing(channel_id).await {
            tracing::debug!(%error, "typing indicator failed");
        }

        let raw = match self.deps.llm.complete(&system_prompt, &turns).await {
            Ok(text) => text,
            Err(error) => {
                tracing::error!(%error, "completion failed, sending fallback reply");
                FALLBACK_REPLY.to_string()
            }
        };

        if raw.contains(SILENCE_TOKEN) {
            tracing::info!("model chose silence");
            return Ok(DispatchOutcome::Silenced);
        }

        let mut text = strip_speaker_prefix(&raw);
        let mut directive_result = None;

        if let Some(directive) = parse_directive(&text) {
            let result =
                execute_directive(&**platform, &self.resolver, &directive, primary).await;
            text = directive.strip(&text);

            if result.success && result.target_channel == Some(channel_id) {
                tracing::info!("directive delivered into this channel, suppressing reply text");
                text.clear();
            }
            directive_result = Some(result);
        }

        if text.is_empty() {
            return Ok(match directive_result {
                Some(directive) => {
                    if directive.target_channel == Some(channel_id) {
                        self.activity.record_reply(channel_id);
                    }
                    DispatchOutcome::Suppressed { directive }
                }
                None => {
                    tracing::info!("empty reply treated as silence");
                    DispatchOutcome::Silenced
                }
            });
        }

        platform.send_message(channel_id, &text).await?;
        self.activity.record_reply(channel_id);
        tracing::info!(reply_len = text.len(), "reply sent");

        if let Some(guild_id) = guild_id {
            self.speak(guild_id, &text).await;
        }

        Ok(DispatchOutcome::Replied {
            text,
            directive: directive_result,
        })
    }

    /// Stored tier, overridden to [`Tier::Boss`] for allow-listed users.
    async fn tier_for(&self, user_id: UserId) -> Tier {
        if self.deps.is_privileged(user_id) {
            tracing::debug!(user_id, "privileged user, forcing boss tier");
            return Tier::Boss;
        }

        match self.deps.tiers.get_tier(user_id).await {
            Ok(tier) => tier,
            Err(error) => {
                tracing::warn!(%error, user_id, "failed to read respect tier, using neutral");
                Tier::Neutral
            }
        }
    }

    async fn environment(
        &self,
        channel_id: ChannelId,
        guild_id: Option<GuildId>,
    ) -> Result<EnvironmentContext> {
        let platform = &self.deps.platform;
        let channel = platform.channel_info(channel_id).await?;
        let guild_id = guild_id.or_else(|| channel.as_ref().and_then(|channel| channel.guild_id));

        let guilds = platform.list_guilds().await?;
        let current_guild = guild_id.and_then(|id| guilds.iter().find(|guild| guild.id == id));

        let visible_channels = match current_guild {
            Some(guild) => platform
                .list_text_channels(guild.id)
                .await?
                .into_iter()
                .filter_map(|channel| channel.name)
                .collect(),
            None => Vec::new(),
        };

        Ok(EnvironmentContext {
            server_name: current_guild
                .map(|guild| guild.name.clone())
                .unwrap_or_else(|| "DM".into()),
            channel_name: channel
                .and_then(|channel| channel.name)
                .unwrap_or_else(|| "DM".into()),
            visible_channels,
            available_servers: guilds.iter().map(|guild| guild.name.clone()).collect(),
        })
    }

    async fn speak(&self, guild_id: GuildId, text: &str) {
        let voice = &self.deps.voice;
        if !voice.is_connected(guild_id) {
            return;
        }
        if let Err(error) = voice.speak(guild_id, text).await {
            tracing::warn!(%error, guild_id, "voice playback failed");
        }
    }
}

#[async_trait]
impl BurstHandler for ResponseDispatcher {
    async fn handle_burst(&self, channel_id: ChannelId) -> Result<()> {
        let outcome = self.run(channel_id).await?;
        tracing::debug!(channel_id, ?outcome, "burst handled");
        Ok(())
    }
}

/// Map channel history to model turns. Bot-authored messages become
/// assistant turns.
fn history_turns(history: &[ChatMessage]) -> Vec<ChatTurn> {
    history
        .iter()
        .map(|message| {
            let content = format!("{}: {}", message.author_display_name, message.content);
            if message.is_bot_author {
                ChatTurn::assistant(content)
            } else {
                ChatTurn::user(content)
            }
        })
        .collect()
}

fn strip_speaker_prefix(text: &str) -> String {
    SPEAKER_PREFIX
        .replace(text.trim_start(), "")
        .trim()
        .to_string()
}
