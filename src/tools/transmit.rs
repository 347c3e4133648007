//! `[[TX: server | channel | message]]`: relay a message to a named channel.

use crate::messaging::ChatPlatform;
use crate::resolve::NameResolver;
use crate::{ChannelId, ChatMessage, GuildInfo};

use regex::Regex;
use std::sync::LazyLock;

static TX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[\[TX:\s*(.*?)\s*\|\s*(.*?)\s*\|\s*(.*?)\]\]").expect("hardcoded regex")
});

/// Reaction placed on the originating message after a successful relay.
pub const SUCCESS_REACTION: &str = "✅";

/// A parsed transmit directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDirective {
    pub server: String,
    pub channel: String,
    pub message: String,
    /// The exact markup as it appeared in the reply.
    pub matched: String,
}

impl ToolDirective {
    /// Remove this directive's markup from `text` and trim the rest.
    pub fn strip(&self, text: &str) -> String {
        text.replacen(&self.matched, "", 1).trim().to_string()
    }
}

/// Extract the first transmit directive. The keyword is case-sensitive and
/// the message field may span lines.
pub fn parse_directive(text: &str) -> Option<ToolDirective> {
    let captures = TX_PATTERN.captures(text)?;
    let field = |index: usize| {
        captures
            .get(index)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };

    Some(ToolDirective {
        server: field(1),
        channel: field(2),
        message: field(3),
        matched: captures.get(0)?.as_str().to_string(),
    })
}

/// Outcome of executing a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectiveResult {
    pub success: bool,
    pub target_channel: Option<ChannelId>,
}

impl DirectiveResult {
    fn delivered(target_channel: ChannelId) -> Self {
        Self {
            success: true,
            target_channel: Some(target_channel),
        }
    }

    fn failed() -> Self {
        Self {
            success: false,
            target_channel: None,
        }
    }
}

/// Resolve the directive's destination and deliver its message.
///
/// Fuzzy matches, lookup failures, and send failures are all reported as
/// whispered notices in the channel `origin` came from.
pub async fn execute_directive(
    platform: &dyn ChatPlatform,
    resolver: &NameResolver,
    directive: &ToolDirective,
    origin: &ChatMessage,
) -> DirectiveResult {
    tracing::info!(
        server = %directive.server,
        channel = %directive.channel,
        message_len = directive.message.len(),
        "executing transmit directive"
    );

    let guilds = match platform.list_guilds().await {
        Ok(guilds) => guilds,
        Err(error) => {
            tracing::error!(%error, "failed to list guilds for directive");
            notify(platform, origin, &format!("(whispering) Failed to send: {error}")).await;
            return DirectiveResult::failed();
        }
    };
    let context_guild = origin
        .guild_id
        .and_then(|id| guilds.iter().find(|guild| guild.id == id));

    let guild = match resolver.resolve_guild(&directive.server, context_guild, &guilds) {
        Ok(found) => {
            if found.is_fuzzy() {
                tracing::info!(query = %directive.server, server = %found.value.name, "fuzzy matched server");
                notify(
                    platform,
                    origin,
                    &format!("(whispering) Assuming you meant server '{}'...", found.value.name),
                )
                .await;
            }
            found.value.clone()
        }
        Err(error) => {
            tracing::warn!(%error, "directive server not found");
            notify(
                platform,
                origin,
                &format!(
                    "(whispering) I couldn't find ANY server looking like '{}', Boss. Try again?",
                    directive.server
                ),
            )
            .await;
            return DirectiveResult::failed();
        }
    };

    let Some(target) = resolve_target_channel(platform, resolver, directive, &guild, origin).await
    else {
        return DirectiveResult::failed();
    };

    match platform.send_message(target, &directive.message).await {
        Ok(()) => {
            if let Err(error) = platform
                .add_reaction(origin.channel_id, origin.id, SUCCESS_REACTION)
                .await
            {
                tracing::warn!(%error, message_id = origin.id, "failed to react to directive origin");
            }
            tracing::info!(guild = %guild.name, channel_id = target, "directive delivered");
            DirectiveResult::delivered(target)
        }
        Err(error) => {
            tracing::error!(%error, channel_id = target, "failed to deliver directive");
            notify(platform, origin, &format!("(whispering) Failed to send: {error}")).await;
            DirectiveResult::failed()
        }
    }
}

async fn resolve_target_channel(
    platform: &dyn ChatPlatform,
    resolver: &NameResolver,
    directive: &ToolDirective,
    guild: &GuildInfo,
    origin: &ChatMessage,
) -> Option<ChannelId> {
    let channels = match platform.list_text_channels(guild.id).await {
        Ok(channels) => channels,
        Err(error) => {
            tracing::error!(%error, guild_id = guild.id, "failed to list channels for directive");
            notify(platform, origin, &format!("(whispering) Failed to send: {error}")).await;
            return None;
        }
    };

    match resolver.resolve_channel(&directive.channel, guild, &channels) {
        Ok(found) => {
            if found.is_fuzzy() {
                tracing::info!(query = %directive.channel, channel = found.value.display_name(), "fuzzy matched channel");
                notify(
                    platform,
                    origin,
                    &format!(
                        "(whispering) Assuming you meant channel '{}'...",
                        found.value.display_name()
                    ),
                )
                .await;
            }
            Some(found.value.id)
        }
        Err(error) => {
            tracing::warn!(%error, "directive channel not found");
            notify(
                platform,
                origin,
                &format!(
                    "(whispering) I found '{}', but no channel looking like '{}'.",
                    guild.name, directive.channel
                ),
            )
            .await;
            None
        }
    }
}

async fn notify(platform: &dyn ChatPlatform, origin: &ChatMessage, text: &str) {
    if let Err(error) = platform.send_message(origin.channel_id, text).await {
        tracing::warn!(%error, channel_id = origin.channel_id, "failed to post directive notice");
    }
}
