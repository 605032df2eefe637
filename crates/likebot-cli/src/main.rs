mod commands;
mod run;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use likebot_config::ConfigStore;

#[derive(Parser)]
#[command(name = "likebot", about = "Daily likes for subscribed OneBot users")]
struct Cli {
    /// Config file (defaults to ~/.likebot/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to OneBot and serve commands until interrupted
    Run,
    /// Like a user once with the configured quota
    Like {
        /// Account id to like
        user_id: String,

        /// Like units to send (overrides per_like_times)
        #[arg(short, long)]
        times: Option<u32>,
    },
    /// List subscribers and their like counts for the current cycle
    Subscribers,
    /// Show who liked the bot account
    SelfLikes,
    /// Check configuration
    Health,
}

fn open_store(path: Option<PathBuf>) -> anyhow::Result<Arc<ConfigStore>> {
    let store = match path {
        Some(path) => {
            // open_default loads .env itself
            let _ = dotenvy::dotenv();
            ConfigStore::open(&path)?
        }
        None => ConfigStore::open_default()?,
    };
    Ok(Arc::new(store))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = open_store(cli.config)?;

    match cli.command {
        Commands::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run::run_bot(store))?;
        }
        Commands::Like { user_id, times } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::like_once(store, &user_id, times))?;
        }
        Commands::Subscribers => commands::print_subscribers(&store),
        Commands::SelfLikes => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::print_self_likes(store))?;
        }
        Commands::Health => commands::print_health(&store),
    }

    Ok(())
}
