//! HiveBuzz auth broker - login service for Hive Keychain, HiveSigner and HiveAuth.

mod error;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use auth_broker::{spawn_sweeper, AuthBroker};
use clap::{Parser, Subcommand};
use hivebuzz_config_and_utils::{init_logging, Config, Paths};
use tracing::info;

/// HiveBuzz auth broker command-line interface.
#[derive(Parser)]
#[command(name = "hivebuzz-auth")]
#[command(about = "Authentication broker for HiveBuzz")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, logs). Defaults to ~/.hivebuzz
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the login endpoints
    Serve {
        /// Address to listen on, overriding the config
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Issue a Keychain challenge and print the message to sign
    Challenge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths).context("loading configuration")?;

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Some(Commands::Serve { bind }) => serve(config, bind).await,
        None => serve(config, None).await,
        Some(Commands::Challenge) => print_challenge(&config),
    }
}

async fn serve(mut config: Config, bind: Option<String>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }

    let broker = Arc::new(AuthBroker::from_config(&config)?);
    let sweeper = spawn_sweeper(
        broker.clone(),
        Duration::from_secs(config.ttl.sweep_interval_secs.max(1)),
    );
    let app = routes::create_router(Arc::new(state::AppState::new(broker, &config)));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, app_url = %config.app_url, "HiveBuzz auth broker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("HiveBuzz auth broker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn print_challenge(config: &Config) -> anyhow::Result<()> {
    let broker = AuthBroker::from_config(config)?;
    let challenge = broker.issue_challenge()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "challenge": challenge.challenge,
            "message": challenge.message,
            "expires_at": challenge.expires_at,
        }))?
    );
    Ok(())
}
