mod check;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "resqx-track")]
#[command(about = "Headless live tracking of ResQ-X field professionals")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Follow the live feed and log every marker change
    Watch {
        /// Viewer id to connect as (defaults to `RESQX_VIEWER_ID`)
        #[arg(long)]
        viewer: Option<String>,
        /// Push event carrying snapshots (defaults to `RESQX_FEED_EVENT`)
        #[arg(long)]
        event: Option<String>,
        /// Only show professionals that are online
        #[arg(long)]
        online_only: bool,
    },
    /// Validate a captured feed payload offline
    CheckPayload {
        /// JSON file with the snapshot object or the full `[event, payload]` array
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            viewer,
            event,
            online_only,
        } => {
            let config = resqx_core::load_app_config()?;
            init_tracing(&config.log_level)?;
            watch::run_watch(&config, viewer, event, online_only).await
        }
        Commands::CheckPayload { file } => {
            let level = std::env::var("RESQX_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
            init_tracing(&level)?;
            check::run_check_payload(&file)
        }
    }
}

/// `RUST_LOG` wins over the configured default level.
fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}
