//! moneta-bot — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Init logger at configured level
//!   4. Build ledger backend, store, sessions, dispatcher
//!   5. Spawn Ctrl-C → shutdown signal watcher
//!   6. Run channels until shutdown

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use moneta_bot::dispatch::Dispatcher;
use moneta_bot::error::AppError;
use moneta_bot::ledger::{LedgerStore, backend};
use moneta_bot::runtime::{Channel, spawn_channels};
use moneta_bot::session::SessionManager;
use moneta_bot::telegram::TelegramChannel;
use moneta_bot::{config, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let config = config::load()?;

    logger::init(&config.log_level)?;

    info!(
        bot_name = %config.bot_name,
        ledger_backend = %config.ledger.backend,
        log_level = %config.log_level,
        known_users = config.users.len(),
        "config loaded"
    );

    let backend = backend::build(&config.ledger, config.sheets_api_token.clone())?;
    let store = LedgerStore::new(backend, &config.ledger);
    let sessions = SessionManager::new(config.users.clone(), &config.entry);
    let dispatcher = Arc::new(Dispatcher::new(sessions, store));

    // Shared shutdown token — Ctrl-C cancels it, all channels watch it.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received — shutting down");
                shutdown.cancel();
            }
        });
    }

    let mut channels: Vec<Box<dyn Channel>> = Vec::new();
    if config.telegram.enabled {
        info!("loading telegram channel");
        channels.push(Box::new(TelegramChannel::new("telegram0", dispatcher.clone())));
    }
    if channels.is_empty() {
        info!("no channels enabled — nothing to run");
    }

    spawn_channels(channels, shutdown).join().await
}
