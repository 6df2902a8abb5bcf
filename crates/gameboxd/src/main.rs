//! gameboxd — the Gamebox daemon.
//!
//! Single binary that assembles all Gamebox subsystems:
//! - Record store (redb)
//! - Cluster gateway (Kubernetes REST or in-memory)
//! - Orchestrator
//! - Reclaimer
//! - REST API
//!
//! # Usage
//!
//! ```text
//! gameboxd serve --config /etc/gamebox/gamebox.toml --port 4000
//! ```

mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use gamebox_core::GameboxConfig;

const DEFAULT_FILTER: &str = "info,gameboxd=debug,gamebox=debug";

#[derive(Parser)]
#[command(name = "gameboxd", about = "Gamebox daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the API and run the reclaimer.
    Serve {
        /// Path to gamebox.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides `server.port`).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides `server.data_dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Parse and validate a config file, then exit.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(
    path: Option<&PathBuf>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<GameboxConfig> {
    let mut config = match path {
        Some(path) => GameboxConfig::from_file(path)?,
        None => GameboxConfig::default(),
    };
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.server.data_dir = data_dir;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
        } => {
            let config = load_config(config.as_ref(), port, data_dir)?;
            server::run(config).await
        }
        Command::CheckConfig { config } => {
            let config = load_config(Some(&config), None, None)?;
            tracing::info!(
                port = config.server.port,
                data_dir = ?config.server.data_dir,
                cluster_mode = ?config.cluster.mode,
                scope = %config.allocation.scope,
                ttl = ?config.allocation_ttl()?,
                "config ok"
            );
            Ok(())
        }
    }
}
