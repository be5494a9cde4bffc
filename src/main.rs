use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::time::interval;

use golosok::cli::{Cli, Commands};
use golosok::core::{config, init_logger, log_entitlement_configuration};
use golosok::speech::SpeechClient;
use golosok::storage::db::{expire_old_premium, get_global_stats};
use golosok::storage::{create_pool, get_connection};
use golosok::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps};

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    let _ = dotenv();

    // Set up global panic handler to catch panics in dispatcher
    // This allows us to log the panic and continue working instead of terminating
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    // Dispatch to appropriate command
    match cli.command {
        Some(Commands::Run) | None => run_bot().await,
        Some(Commands::Expire) => run_expire_pass(),
        Some(Commands::Stats) => run_print_stats(),
    }
}

/// One-shot expiry pass over all premium records
fn run_expire_pass() -> Result<()> {
    let db_pool = create_pool(&config::DATABASE_PATH)?;
    let conn = get_connection(&db_pool)?;
    let expired = expire_old_premium(&conn)?;
    log::info!("Expire pass finished: {} subscription(s) deactivated", expired);
    Ok(())
}

/// Print global statistics to the log and exit
fn run_print_stats() -> Result<()> {
    let db_pool = create_pool(&config::DATABASE_PATH)?;
    let conn = get_connection(&db_pool)?;
    let stats = get_global_stats(&conn)?;
    log::info!(
        "Stats: {} users, {} premium, {} active today, {} chars synthesized",
        stats.total_users,
        stats.premium_users,
        stats.active_today,
        stats.total_chars
    );
    Ok(())
}

/// Run the bot: database pool, dispatcher, background expiry sweeper
async fn run_bot() -> Result<()> {
    log_entitlement_configuration();

    let db_pool = Arc::new(create_pool(&config::DATABASE_PATH)?);
    log::info!("Database ready at {}", *config::DATABASE_PATH);

    let bot = create_bot()?;

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    // Background sweeper: lazy expiry on read already guarantees correctness,
    // this keeps /users and /stats from showing long-dead subscriptions
    let sweeper_pool = Arc::clone(&db_pool);
    tokio::spawn(async move {
        let mut ticker = interval(config::sweeper::interval());
        loop {
            ticker.tick().await;
            match get_connection(&sweeper_pool) {
                Ok(conn) => {
                    if let Err(e) = expire_old_premium(&conn) {
                        log::error!("Expiry sweep failed: {}", e);
                    }
                }
                Err(e) => log::error!("Expiry sweep could not get a connection: {}", e),
            }
        }
    });

    let speech = Arc::new(SpeechClient::from_env());
    let deps = HandlerDeps::new(Arc::clone(&db_pool), speech);

    log::info!("Starting bot dispatcher...");
    Dispatcher::builder(bot, schema(deps))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
