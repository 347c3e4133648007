//! Configuration loading and validation.
//!
//! Values come from an optional TOML file with environment variables layered
//! on top. The Discord token is the only required value.

use crate::UserId;
use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai";
const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";

/// Bobbot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Platform access token.
    pub discord_token: String,

    /// Data directory path (SQLite lives here).
    pub data_dir: PathBuf,

    /// Persona text file. Falls back to a built-in one-liner when absent.
    pub persona_path: Option<PathBuf>,

    /// LLM provider configuration.
    pub llm: LlmConfig,

    /// Debounce, dispatch and operator settings.
    pub bot: BotConfig,
}

/// OpenAI-compatible provider configuration.
#[derive(Clone)]
pub struct LlmConfig {
    /// Base URL without the `/v1/chat/completions` suffix.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.into(),
            api_key: None,
            model: DEFAULT_LLM_MODEL.into(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 120,
        }
    }
}

/// Runtime behavior of the bot.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Users allowed to run operator commands. Always treated as Tier 1.
    pub privileged_users: Vec<UserId>,

    /// Quiet period a channel must stay silent before a burst is answered.
    pub quiet_period: Duration,

    /// Number of recent messages fetched as model history.
    pub history_limit: u8,

    /// Minimum similarity for fuzzy server/channel name matches.
    pub fuzzy_threshold: f64,

    /// When inbound messages start the debouncer.
    pub trigger: TriggerConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            privileged_users: Vec::new(),
            quiet_period: Duration::from_millis(2000),
            history_limit: 10,
            fuzzy_threshold: 0.5,
            trigger: TriggerConfig::default(),
        }
    }
}

/// Response trigger policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Every non-empty message starts a burst.
    #[default]
    Always,
    /// Only messages addressed to the bot, or inside an active conversation.
    Addressed,
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub mode: TriggerMode,

    /// Name that counts as addressing the bot when it appears in content.
    pub bot_name: String,

    /// How long after a bot reply the channel keeps triggering without address.
    pub active_window: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::Always,
            bot_name: "bob".into(),
            active_window: Duration::from_secs(120),
        }
    }
}

/// On-disk TOML shape. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    discord_token: Option<String>,
    data_dir: Option<PathBuf>,
    persona_path: Option<PathBuf>,
    privileged_users: Option<Vec<UserId>>,
    quiet_period_ms: Option<u64>,
    history_limit: Option<u8>,
    fuzzy_threshold: Option<f64>,
    trigger: Option<FileTriggerConfig>,
    llm: Option<FileLlmConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileTriggerConfig {
    mode: Option<TriggerMode>,
    bot_name: Option<String>,
    active_window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLlmConfig {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from the environment only.
    pub fn load() -> Result<Self> {
        Self::from_sources(FileConfig::default(), |key| std::env::var(key).ok())
    }

    /// Load a TOML config file, then apply environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Load {
            path: path.display().to_string(),
            source: Arc::new(error),
        })?;
        let file = parse_file(&raw, path)?;
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let discord_token = env("DISCORD_TOKEN")
            .or(file.discord_token)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey("DISCORD_TOKEN".into()))?;

        let data_dir = env("BOBBOT_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(default_data_dir);

        let persona_path = env("BOBBOT_PERSONA_PATH")
            .map(PathBuf::from)
            .or(file.persona_path);

        let file_llm = file.llm.unwrap_or_default();
        let defaults = LlmConfig::default();
        let llm = LlmConfig {
            base_url: env("BOBBOT_LLM_BASE_URL")
                .or(file_llm.base_url)
                .unwrap_or(defaults.base_url),
            api_key: env("BOBBOT_LLM_API_KEY")
                .or_else(|| env("GROQ_API_KEY"))
                .or_else(|| env("OPENAI_API_KEY"))
                .or(file_llm.api_key),
            model: env("BOBBOT_LLM_MODEL")
                .or(file_llm.model)
                .unwrap_or(defaults.model),
            temperature: file_llm.temperature.unwrap_or(defaults.temperature),
            max_tokens: file_llm.max_tokens.unwrap_or(defaults.max_tokens),
            timeout_secs: file_llm.timeout_secs.unwrap_or(defaults.timeout_secs),
        };

        let privileged_users = match env("BOBBOT_PRIVILEGED_USERS") {
            Some(raw) => parse_user_list(&raw)?,
            None => file.privileged_users.unwrap_or_default(),
        };

        let bot_defaults = BotConfig::default();
        let file_trigger = file.trigger.unwrap_or_default();
        let trigger = TriggerConfig {
            mode: file_trigger.mode.unwrap_or(bot_defaults.trigger.mode),
            bot_name: file_trigger
                .bot_name
                .unwrap_or(bot_defaults.trigger.bot_name),
            active_window: file_trigger
                .active_window_secs
                .map(Duration::from_secs)
                .unwrap_or(bot_defaults.trigger.active_window),
        };

        let bot = BotConfig {
            privileged_users,
            quiet_period: file
                .quiet_period_ms
                .map(Duration::from_millis)
                .unwrap_or(bot_defaults.quiet_period),
            history_limit: file.history_limit.unwrap_or(bot_defaults.history_limit),
            fuzzy_threshold: file
                .fuzzy_threshold
                .unwrap_or(bot_defaults.fuzzy_threshold),
            trigger,
        };

        let config = Self {
            discord_token,
            data_dir,
            persona_path,
            llm,
            bot,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.bot.fuzzy_threshold) {
            return Err(ConfigError::Invalid(format!(
                "fuzzy_threshold must be within 0.0..=1.0, got {}",
                self.bot.fuzzy_threshold
            ))
            .into());
        }
        // Discord caps history fetches at 100 messages.
        if self.bot.history_limit == 0 || self.bot.history_limit > 100 {
            return Err(ConfigError::Invalid(format!(
                "history_limit must be within 1..=100, got {}",
                self.bot.history_limit
            ))
            .into());
        }
        Ok(())
    }

    /// Create the data directory if it does not exist yet.
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).with_context(|| {
            format!(
                "failed to create data directory: {}",
                self.data_dir.display()
            )
        })?;
        Ok(())
    }

    /// Get the SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("respect.db")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("bobbot"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn parse_file(raw: &str, path: &Path) -> Result<FileConfig> {
    toml::from_str(raw).map_err(|error| {
        ConfigError::Parse {
            path: path.display().to_string(),
            reason: error.to_string(),
        }
        .into()
    })
}

fn parse_user_list(raw: &str) -> Result<Vec<UserId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<UserId>().map_err(|_| {
                crate::Error::from(ConfigError::Invalid(format!(
                    "invalid user id in BOBBOT_PRIVILEGED_USERS: {part}"
                )))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_token_is_fatal() {
        let error = Config::from_sources(FileConfig::default(), env_from(&[]))
            .expect_err("token is required");
        assert!(matches!(
            error,
            crate::Error::Config(ConfigError::MissingKey(ref key)) if key == "DISCORD_TOKEN"
        ));
    }

    #[test]
    fn blank_token_is_treated_as_missing() {
        let error = Config::from_sources(FileConfig::default(), env_from(&[("DISCORD_TOKEN", "  ")]))
            .expect_err("blank token must be rejected");
        assert!(error.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::from_sources(FileConfig::default(), env_from(&[("DISCORD_TOKEN", "t")]))
            .expect("config should load");

        assert_eq!(config.bot.quiet_period, Duration::from_secs(2));
        assert_eq!(config.bot.history_limit, 10);
        assert_eq!(config.bot.fuzzy_threshold, 0.5);
        assert_eq!(config.bot.trigger.mode, TriggerMode::Always);
        assert!(config.bot.privileged_users.is_empty());
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.llm.max_tokens, 1024);
    }

    #[test]
    fn environment_overrides_file() {
        let file = parse_file(
            indoc::indoc! {r#"
                discord_token = "from-file"
                privileged_users = [1, 2]
                quiet_period_ms = 500
                history_limit = 25

                [trigger]
                mode = "addressed"
                bot_name = "robert"

                [llm]
                model = "file-model"
                api_key = "file-key"
            "#},
            Path::new("bobbot.toml"),
        )
        .expect("fixture should parse");

        let config = Config::from_sources(
            file,
            env_from(&[
                ("DISCORD_TOKEN", "from-env"),
                ("BOBBOT_PRIVILEGED_USERS", "42, 43"),
                ("GROQ_API_KEY", "groq-key"),
            ]),
        )
        .expect("config should load");

        assert_eq!(config.discord_token, "from-env");
        assert_eq!(config.bot.privileged_users, vec![42, 43]);
        assert_eq!(config.bot.quiet_period, Duration::from_millis(500));
        assert_eq!(config.bot.history_limit, 25);
        assert_eq!(config.bot.trigger.mode, TriggerMode::Addressed);
        assert_eq!(config.bot.trigger.bot_name, "robert");
        assert_eq!(config.llm.model, "file-model");
        assert_eq!(config.llm.api_key.as_deref(), Some("groq-key"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let file = FileConfig {
            fuzzy_threshold: Some(1.5),
            ..Default::default()
        };
        let error = Config::from_sources(file, env_from(&[("DISCORD_TOKEN", "t")]))
            .expect_err("threshold above 1.0 must fail");
        assert!(error.to_string().contains("fuzzy_threshold"));
    }

    #[test]
    fn rejects_malformed_privileged_list() {
        let error = Config::from_sources(
            FileConfig::default(),
            env_from(&[("DISCORD_TOKEN", "t"), ("BOBBOT_PRIVILEGED_USERS", "12,boss")]),
        )
        .expect_err("non-numeric id must fail");
        assert!(error.to_string().contains("boss"));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let error = parse_file("quiet_period = 3", Path::new("x.toml"))
            .expect_err("unknown key must fail");
        assert!(error.to_string().contains("x.toml"));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let llm = LlmConfig {
            api_key: Some("secret-value".into()),
            ..Default::default()
        };
        let rendered = format!("{llm:?}");
        assert!(!rendered.contains("secret-value"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
