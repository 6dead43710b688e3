use std::str::FromStr;

use clap::Parser;
use kalshid::cli::{Cli, Commands, RunArgs};
use kalshid::config::Config;
use kalshid::core::domain::Environment;
use kalshid::core::persistence::{create_pool, PersistenceStore, SqliteStore};
use kalshid::error::{self, ConfigError};
use kalshid::{app, error::Error};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run(args) => run(&cli, args).await,
        Commands::Status => status(&cli).await,
    };

    if let Err(e) = result {
        eprintln!("kalshid: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, args: &RunArgs) -> error::Result<()> {
    let mut config = Config::load(&cli.config)?;

    if args.json_logs {
        config.logging.format = "json".to_string();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(env) = &args.environment {
        config.active_environment =
            Environment::from_str(env).map_err(|reason| ConfigError::InvalidValue {
                field: "--environment",
                reason,
            })?;
    }
    if args.dry_run {
        config.global_trading_enabled = false;
    }

    config.init_logging();
    info!(version = env!("CARGO_PKG_VERSION"), "kalshid starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(app::run(config, shutdown_rx));

    tokio::select! {
        result = task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "fatal error");
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, "orchestrator task panicked");
                    return Err(Error::Execution(e.to_string()));
                }
            }
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    }

    info!("kalshid stopped");
    Ok(())
}

/// A lightweight liveness check: opens the configured SQLite database
/// read-only and reports what the last running process persisted. This
/// backend has no systemd unit or PID file to inspect (it runs under
/// whatever process supervisor the operator already has) and no local
/// control-API surface yet (see `core::broadcast`), so this is necessarily
/// best-effort rather than a live health check.
async fn status(cli: &Cli) -> error::Result<()> {
    let config = Config::load(&cli.config)?;

    let Some(path) = &config.database_path else {
        println!("no DATABASE_PATH configured, nothing to inspect");
        return Ok(());
    };

    let pool = create_pool(&format!("sqlite://{path}"))?;
    let store = SqliteStore::new(pool);

    let agents = store.load_agent_states().await?;
    if agents.is_empty() {
        println!("database at {path}: no persisted agent state yet");
    } else {
        println!("database at {path}:");
        for agent in &agents {
            println!(
                "  agent {} ({}): enabled={} mode={:?} state={:?}",
                agent.agent_id(),
                agent.name(),
                agent.enabled(),
                agent.mode(),
                agent.lifecycle_state(),
            );
        }
    }

    for environment in [Environment::Live, Environment::Demo] {
        let open_orders = store.get_open_orders(environment).await?;
        let positions = store.get_positions(environment).await?;
        println!(
            "  {environment}: {} open order(s), {} position(s)",
            open_orders.len(),
            positions.len()
        );
    }

    Ok(())
}
