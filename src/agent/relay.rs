//! Operator commands: `!tx <channel_id> <message>`, `!tier <user_id> <1|2|3>`,
//! `!join <channel_id>` and `!leave`.

use crate::{BotDeps, ChannelId, ChatMessage, UserId};

pub const TX_USAGE: &str = "Usage: `!tx <channel_id> <message>`";
pub const TIER_USAGE: &str = "Usage: `!tier <user_id> <1|2|3>`";
pub const JOIN_USAGE: &str = "Usage: `!join <voice_channel_id>`";

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    /// Send `content` verbatim to a channel by id.
    Transmit {
        channel_id: ChannelId,
        content: String,
    },
    /// Store a user's respect tier. The value is validated on execution.
    SetTier { user_id: UserId, tier: i64 },
    /// Join or move to a voice channel by id.
    JoinVoice { channel_id: ChannelId },
    /// Leave voice in the guild the command was sent from.
    LeaveVoice,
    /// Recognized command with missing or malformed arguments.
    Malformed { usage: &'static str },
}

impl RelayCommand {
    /// Parse an operator command. `None` means the message is not one.
    ///
    /// Arguments are split on single spaces at most twice, so the relayed
    /// content keeps its own spacing.
    pub fn parse(content: &str) -> Option<Self> {
        let mut parts = content.splitn(3, ' ');
        let command = parts.next()?;

        match command {
            "!tx" => {
                let channel_id = parts.next().and_then(|raw| raw.parse::<ChannelId>().ok());
                let body = parts.next().filter(|body| !body.is_empty());
                Some(match (channel_id, body) {
                    (Some(channel_id), Some(body)) => RelayCommand::Transmit {
                        channel_id,
                        content: body.to_string(),
                    },
                    _ => RelayCommand::Malformed { usage: TX_USAGE },
                })
            }
            "!tier" => {
                let user_id = parts.next().and_then(|raw| raw.parse::<UserId>().ok());
                let tier = parts.next().and_then(|raw| raw.trim().parse::<i64>().ok());
                Some(match (user_id, tier) {
                    (Some(user_id), Some(tier)) => RelayCommand::SetTier { user_id, tier },
                    _ => RelayCommand::Malformed { usage: TIER_USAGE },
                })
            }
            "!join" => Some(
                match parts.next().and_then(|raw| raw.trim().parse::<ChannelId>().ok()) {
                    Some(channel_id) => RelayCommand::JoinVoice { channel_id },
                    None => RelayCommand::Malformed { usage: JOIN_USAGE },
                },
            ),
            "!leave" => Some(RelayCommand::LeaveVoice),
            _ => None,
        }
    }
}

/// Executes operator commands for allow-listed users.
#[derive(Debug, Clone)]
pub struct PrivilegedRelay {
    deps: BotDeps,
}

impl PrivilegedRelay {
    pub fn new(deps: BotDeps) -> Self {
        Self { deps }
    }

    /// Handle `message` if it is an operator command. Returns `true` when
    /// the message was consumed, including unauthorized attempts, which are
    /// dropped without a reply.
    pub async fn handle(&self, message: &ChatMessage) -> bool {
        let Some(command) = RelayCommand::parse(&message.content) else {
            return false;
        };

        if !self.deps.is_privileged(message.author_id) {
            tracing::warn!(
                author_id = message.author_id,
                author = %message.author_display_name,
                channel_id = message.channel_id,
                "unauthorized operator command"
            );
            return true;
        }

        let reply = self.execute(command, message).await;
        if let Err(error) = self
            .deps
            .platform
            .send_message(message.channel_id, &reply)
            .await
        {
            tracing::error!(%error, channel_id = message.channel_id, "failed to send operator reply");
        }
        true
    }

    async fn execute(&self, command: RelayCommand, message: &ChatMessage) -> String {
        match command {
            RelayCommand::Malformed { usage } => usage.to_string(),
            RelayCommand::Transmit {
                channel_id,
                content,
            } => self.transmit(channel_id, &content).await,
            RelayCommand::SetTier { user_id, tier } => {
                match self.deps.tiers.set_tier_value(user_id, tier).await {
                    Ok(tier) => format!("✅ Tier for `{user_id}` set to {tier}"),
                    Err(error) => {
                        tracing::warn!(%error, user_id, "operator tier update failed");
                        format!("❌ Error: {error}")
                    }
                }
            }
            RelayCommand::JoinVoice { channel_id } => self.join_voice(channel_id).await,
            RelayCommand::LeaveVoice => self.leave_voice(message).await,
        }
    }

    async fn join_voice(&self, channel_id: ChannelId) -> String {
        let channel = match self.deps.platform.channel_info(channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => return format!("❌ Could not find channel `{channel_id}`"),
            Err(error) => {
                tracing::error!(%error, channel_id, "voice channel lookup failed");
                return format!("❌ Error: {error}");
            }
        };
        let Some(guild_id) = channel.guild_id else {
            return "❌ Voice channels only exist in servers".to_string();
        };

        match self.deps.voice.connect(guild_id, channel_id).await {
            Ok(Some(_)) => format!("🔊 Moved to {} (`{channel_id}`)", channel.display_name()),
            Ok(None) => format!("🔊 Joined {} (`{channel_id}`)", channel.display_name()),
            Err(error) => {
                tracing::error!(%error, guild_id, channel_id, "voice connect failed");
                format!("❌ Error: {error}")
            }
        }
    }

    async fn leave_voice(&self, message: &ChatMessage) -> String {
        let Some(guild_id) = message.guild_id else {
            return "❌ Send `!leave` from the server to leave its voice channel".to_string();
        };

        match self.deps.voice.disconnect(guild_id).await {
            Ok(Some(_)) => "👋 Left voice".to_string(),
            Ok(None) => "❌ Not in a voice channel here".to_string(),
            Err(error) => {
                tracing::error!(%error, guild_id, "voice disconnect failed");
                format!("❌ Error: {error}")
            }
        }
    }

    async fn transmit(&self, channel_id: ChannelId, content: &str) -> String {
        let platform = &self.deps.platform;
        let channel = match platform.channel_info(channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => return format!("❌ Could not find channel `{channel_id}`"),
            Err(error) => {
                tracing::error!(%error, channel_id, "operator channel lookup failed");
                return format!("❌ Error: {error}");
            }
        };

        match platform.send_message(channel_id, content).await {
            Ok(()) => {
                tracing::info!(channel_id, content_len = content.len(), "operator relay sent");
                format!("✅ Sent to {} (`{channel_id}`)", channel.display_name())
            }
            Err(error) => {
                tracing::error!(%error, channel_id, "operator relay failed");
                format!("❌ Error: {error}")
            }
        }
    }
}
