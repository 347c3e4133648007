//! Bobbot CLI entry point.

use bobbot::agent::{ChannelDebouncer, ConversationActivity, InboundRouter, ResponseDispatcher};
use bobbot::messaging::{DiscordHandler, DiscordPlatform};

use anyhow::Context as _;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bobbot")]
#[command(about = "A Discord persona bot that answers each burst of chatter once")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine.
    dotenvy::dotenv().ok();

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{default_level},serenity=warn,sqlx=warn"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("starting bobbot");

    let config = if let Some(config_path) = cli.config {
        bobbot::config::Config::load_from_path(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        bobbot::config::Config::load()
            .with_context(|| "failed to load configuration from environment")?
    };

    config.ensure_data_dir()?;
    tracing::info!(data_dir = %config.data_dir.display(), "configuration loaded");

    if config.bot.privileged_users.is_empty() {
        tracing::warn!("no privileged users configured, operator commands are disabled");
    }

    let tiers = bobbot::tier::TierStore::connect(&config.sqlite_path())
        .await
        .with_context(|| "failed to open respect tier database")?;

    let persona = bobbot::prompts::load_persona(config.persona_path.as_deref());
    let llm = bobbot::llm::LlmManager::new(config.llm.clone())
        .with_context(|| "failed to initialize LLM client")?;

    let platform = Arc::new(DiscordPlatform::new());
    let deps = bobbot::BotDeps {
        platform: platform.clone(),
        llm: Arc::new(llm),
        voice: Arc::new(bobbot::voice::VoiceSessions::new()),
        tiers: tiers.clone(),
        settings: Arc::new(config.bot.clone()),
        persona: Arc::from(persona),
    };

    let activity = ConversationActivity::default();
    let dispatcher = Arc::new(ResponseDispatcher::new(deps.clone(), activity.clone()));
    let debouncer = ChannelDebouncer::new(dispatcher, config.bot.quiet_period);
    let router = Arc::new(InboundRouter::new(deps, debouncer, activity));

    let handler = DiscordHandler::new(platform, router.clone());
    let mut client = serenity::Client::builder(&config.discord_token, DiscordPlatform::intents())
        .event_handler(handler)
        .await
        .with_context(|| "failed to build discord client")?;

    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        result = client.start() => {
            if let Err(error) = result {
                tracing::error!(%error, "discord client stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            shard_manager.shutdown_all().await;
        }
    }

    router.shutdown();
    tiers.close().await;

    tracing::info!("bobbot stopped");
    Ok(())
}
