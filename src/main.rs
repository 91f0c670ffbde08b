//! Hypebot CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use hypebot::character::CharacterManager;
use hypebot::config::{Config, RuntimeConfig};
use hypebot::conversation::ConversationStore;
use hypebot::gate::Gatekeeper;
use hypebot::handler::MessageHandler;
use hypebot::llm::{GenerationManager, TemplateOracle};
use hypebot::marketing::MarketingScheduler;
use hypebot::messaging::{DiscordAdapter, MessagingManager, TelegramAdapter};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hypebot")]
#[command(about = "A promotional conversational agent with per-channel reply gating")]
struct Cli {
    /// Character to run (optional when exactly one is defined)
    #[arg(short = 'C', long)]
    character: Option<String>,

    /// Directory of character template files
    #[arg(short, long, default_value = "templates")]
    templates: std::path::PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Hypebot...");

    let config = Config::load().with_context(|| "failed to load configuration from environment")?;
    let config = Arc::new(RuntimeConfig::new(config));

    let characters = CharacterManager::load(&cli.templates)
        .with_context(|| format!("failed to load characters from {}", cli.templates.display()))?;
    let character = characters.select(cli.character.as_deref(), &cli.templates)?;
    tracing::info!(character = %character.name, "character selected");

    let generator = Arc::new(GenerationManager::new(&config.load().llm)?);
    generator
        .startup_check()
        .await
        .with_context(|| "generation backend startup check failed")?;

    let store = Arc::new(ConversationStore::new());
    let oracle = Arc::new(TemplateOracle::new(generator.clone(), character.clone()));
    let gatekeeper = Arc::new(Gatekeeper::new(
        config.clone(),
        store.clone(),
        character.clone(),
        oracle,
        generator.clone(),
    ));
    let marketing = Arc::new(MarketingScheduler::new(
        config.clone(),
        character.clone(),
        generator,
    ));
    let handler = Arc::new(MessageHandler::new(config.clone(), store, marketing, gatekeeper));

    let mut messaging = MessagingManager::new();
    for client in &character.clients {
        match client.as_str() {
            "discord" => {
                let token = std::env::var("DISCORD_TOKEN")
                    .with_context(|| "DISCORD_TOKEN is not set")?;
                messaging.register(DiscordAdapter::new(token));
            }
            "telegram" => {
                let token = std::env::var("TELEGRAM_BOT_TOKEN")
                    .with_context(|| "TELEGRAM_BOT_TOKEN is not set")?;
                messaging.register(TelegramAdapter::new(token));
            }
            other => {
                tracing::warn!(client = other, "unknown client in character file, skipping");
            }
        }
    }
    if messaging.is_empty() {
        anyhow::bail!("character '{}' lists no usable clients", character.name);
    }

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let config = config.clone();
        let mut sighup =
            signal(SignalKind::hangup()).with_context(|| "failed to install SIGHUP handler")?;
        tokio::spawn(async move {
            while sighup.recv().await.is_some() {
                if let Err(error) = config.reload() {
                    tracing::error!(%error, "configuration reload failed, keeping previous");
                }
            }
        });
    }

    tracing::info!("Hypebot started");

    tokio::select! {
        result = messaging.run(handler) => {
            result.with_context(|| "messaging manager stopped")?;
            tracing::info!("All adapter streams ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    messaging.shutdown().await;
    tracing::info!("Hypebot stopped");
    Ok(())
}
