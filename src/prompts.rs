//! System prompt assembly.

use crate::tier::Tier;
use std::path::Path;

/// Persona used when no persona file is configured or it cannot be read.
pub const FALLBACK_PERSONA: &str = "You are Bob, a tough Discord bot.";

/// Where the reply is going, as shown to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentContext {
    /// Guild name, or "DM".
    pub server_name: String,
    /// Channel name, or "DM".
    pub channel_name: String,
    /// Text channels visible in the current guild.
    pub visible_channels: Vec<String>,
    /// Every guild the bot belongs to.
    pub available_servers: Vec<String>,
}

/// Build the final system prompt. Pure: identical inputs give identical output.
pub fn build_system_prompt(persona: &str, tier: Tier, environment: &EnvironmentContext) -> String {
    let mut prompt = String::with_capacity(persona.len() + 512);
    prompt.push_str(persona);

    prompt.push_str("\n\n[ENVIRONMENT DATA]\n");
    prompt.push_str(&format!("Current Server: {}\n", environment.server_name));
    prompt.push_str(&format!("Current Channel: {}\n", environment.channel_name));
    prompt.push_str(&format!(
        "Channels: {}\n",
        environment.visible_channels.join(", ")
    ));
    prompt.push_str(&format!(
        "Servers: {}\n",
        environment.available_servers.join(", ")
    ));

    prompt.push_str("\n[CURRENT INTERACTION CONTEXT]\n");
    prompt.push_str(&format!(
        "The user you are replying to is Respect Tier {tier}. "
    ));
    prompt.push_str(tier_directive(tier));
    prompt
}

fn tier_directive(tier: Tier) -> &'static str {
    match tier {
        Tier::Boss => {
            "**CRITICAL: This user is your BOSS/O.G.** You are fiercely loyal. Address them \
             with maximum respect (e.g., 'Boss', 'Chief'). Agree with them. NEVER use \
             [SILENCE] with the Boss."
        }
        Tier::Neutral => "Be neutral and skeptical.",
        Tier::Cold => "Be sharp, dismissive, or cold.",
    }
}

/// Read the persona file, falling back to [`FALLBACK_PERSONA`].
pub fn load_persona(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return FALLBACK_PERSONA.to_string();
    };

    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            tracing::warn!(path = %path.display(), "persona file is empty, using fallback");
            FALLBACK_PERSONA.to_string()
        }
        Err(error) => {
            tracing::warn!(%error, path = %path.display(), "failed to read persona file, using fallback");
            FALLBACK_PERSONA.to_string()
        }
    }
}
