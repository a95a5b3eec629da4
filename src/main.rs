use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cama::{record_demo, seed_default_stations, App, Config};
use cama_core::SimulatedMeter;

#[derive(Parser)]
#[command(name = "cama", version, about = "Offline-first capture and sync core for cave surveys")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the sync loop until Ctrl-C (default)
    Run,
    /// Record a sample checkpoint and gas session while the sync loop runs
    Demo,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = Cli::parse().command.unwrap_or(Command::Run);

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: CAMA_DB_PATH (default: ./cama.redb)");
            eprintln!("Optional: CAMA_INBOX_PATH (default: ./outbox.jsonl)");
            eprintln!("Optional: CAMA_SYNC_INTERVAL_SECS, CAMA_SYNC_BATCH_SIZE, CAMA_SINK_TIMEOUT_SECS");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting CAMA");
    tracing::info!("Database path: {}", config.db_path.display());
    tracing::info!("Inbox path: {}", config.inbox_path.display());

    // Open database and wire services
    let app = match App::open(&config) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    match seed_default_stations(app.store.as_ref()) {
        Ok(0) => {}
        Ok(n) => tracing::info!("Seeded {} survey stations", n),
        Err(e) => {
            eprintln!("Failed to seed survey stations: {}", e);
            std::process::exit(1);
        }
    }

    // Report what survived the last run
    if let Err(e) = app.recovery().log_summary() {
        tracing::error!("Recovery inspection failed: {}", e);
    }

    // The sync loop runs on its own task while capture goes through `app`
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine = app.engine.clone();
    let sync_task = tokio::spawn(async move {
        engine.run(shutdown_rx).await;
    });

    match command {
        Command::Run => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        }
        Command::Demo => match record_demo(&app, &SimulatedMeter::new()) {
            Ok(report) => tracing::info!(
                checkpoint = %report.checkpoint_id,
                session = %report.session_id,
                sequences = ?report.sequences,
                "demo recorded"
            ),
            Err(e) => tracing::error!("Demo failed: {}", e),
        },
    }
    tracing::info!("Shutting down");

    let _ = shutdown_tx.send(true);
    if let Err(e) = sync_task.await {
        tracing::error!("Sync task failed: {}", e);
    }

    // Last attempt to push pending changes before exit
    let result = app.engine.drain().await;
    tracing::info!(
        sent = result.sent,
        failed = result.failed,
        "final drain finished"
    );
}
