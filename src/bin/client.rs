//! Portsicle client
//!
//! Exposes a local HTTP server through the public relay:
//! - Connects to the relay and prints the public URL
//! - Replays relayed requests against localhost
//! - Closes the session cleanly on Ctrl-C

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portsicle::{config::Config, SessionEnd, TunnelClient};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Portsicle - expose a local server to the internet
#[derive(Parser, Debug)]
#[command(name = "portsicle")]
#[command(about = "Portsicle - expose a local HTTP server through a public URL")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Expose a local HTTP server
    Http {
        /// Port of the local server
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).context("Failed to load configuration")?,
        None => Config::default(),
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    init_logging(&config);

    match args.command {
        Command::Http { port } => {
            if let Some(port) = port {
                config.client.local_port = port;
            }
            run_http(config).await
        }
    }
}

async fn run_http(config: Config) -> Result<()> {
    info!(
        version = portsicle::VERSION,
        local_port = config.client.local_port,
        "Portsicle starting"
    );

    let client = TunnelClient::connect(&config)
        .await
        .context("Failed to establish tunnel")?;

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Without a handler the session only ends from the relay side
            warn!(error = %e, "Cannot listen for interrupt");
            std::future::pending::<()>().await;
        }
    };

    match client.run(interrupt).await {
        Ok(SessionEnd::Interrupted) => {
            info!("Thanks for using Portsicle! Have a nice day :)");
            Ok(())
        }
        Ok(SessionEnd::RelayClosed) => Ok(()),
        Ok(SessionEnd::ConnectionLost(e)) => {
            error!(error = %e, "Tunnel connection lost");
            Err(e).context("Tunnel connection lost")
        }
        Err(e) => Err(e).context("Tunnel failed"),
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format.as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.init(),
    }
}
