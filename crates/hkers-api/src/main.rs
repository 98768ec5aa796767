//! HKERS API server binary

use anyhow::{Context, Result};
use clap::Parser;
use hkers_api::cli::{run_user_command, Cli, Commands};
use hkers_api::{server, AppConfig, SqliteDirectory};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let directory = SqliteDirectory::open(&cli.database)
        .with_context(|| format!("failed to open database {}", cli.database.display()))?;

    match cli.into_command() {
        Commands::Serve(args) => {
            let config = AppConfig::from_env().context("invalid configuration")?;
            server::run(config, Arc::new(directory), &args.host, args.port).await
        }
        Commands::Users { command } => {
            let mut stdout = std::io::stdout();
            run_user_command(&directory, command, &mut stdout).await
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hkers_api=info,hkers_auth=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
