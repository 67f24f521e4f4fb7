use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use sweepbot_api::AppState;
use sweepbot_engine::TaskRegistry;
use sweepbot_store::TaskStore;

#[derive(Parser)]
#[command(name = "sweepbot", about = "Scheduled Discord channel-purge bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot and the control API server
    Run {
        /// Config file path (defaults to ~/.sweepbot/config.json5)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// API port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Load and print the resolved configuration, then exit
    ValidateConfig {
        /// Config file path (defaults to ~/.sweepbot/config.json5)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<sweepbot_config::SweepbotConfig> {
    match path {
        Some(path) => sweepbot_config::load_config_from(&path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => sweepbot_config::load_config().context("failed to load config"),
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run(config, port))?;
        }
        Commands::ValidateConfig { config } => {
            let mut config = load_config(config)?;
            if config.discord_token.is_some() {
                config.discord_token = Some("<redacted>".into());
            }
            println!("{config:#?}");
        }
    }

    Ok(())
}

async fn run(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.api.port = port;
    }

    let token = config
        .discord_token
        .as_deref()
        .context("no Discord token: set DISCORD_TOKEN or discord_token in the config")?;

    let bot = sweepbot_discord::DiscordBot::start(token).await?;

    let store = TaskStore::new(&config.tasks_file);
    info!(tasks_file = %store.path().display(), "loading persisted tasks");
    let registry = Arc::new(TaskRegistry::new(store, bot.gateway.clone()));

    let spawned = registry
        .reload_all()
        .await
        .map_err(|e| anyhow::anyhow!("failed to reload tasks: {e}"))?;
    info!(spawned, "persisted tasks rescheduled");

    let app = sweepbot_api::router(AppState {
        registry: registry.clone(),
        directory: bot.gateway.clone(),
    });

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "control API listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("API server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    registry.shutdown().await;
    bot.shutdown().await;
    Ok(())
}
