//! Telegram bot integration and handlers

pub mod admin;
pub mod bot;
pub mod broadcast;
pub mod handlers;
pub mod markdown;
pub mod membership;
pub mod menu;
pub mod notifications;
pub mod types;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands, Command};
pub use handlers::schema::schema;
pub use types::{HandlerDeps, HandlerError};
