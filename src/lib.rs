//! Golosok - Telegram bot that clones a user's voice and speaks any text with it
//!
//! This library provides all the core functionality for the Golosok bot:
//! the entitlement engine (free-tier quotas, premium plans, the one-time
//! voice-clone limit), persistence, the speech provider gateway and the
//! Telegram integration.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, logging, the entitlement engine
//! - `storage`: Database access and per-user records
//! - `speech`: Voice-clone / text-to-speech provider client
//! - `telegram`: Telegram bot integration and handlers

pub mod cli;
pub mod core;
pub mod speech;
pub mod storage;
pub mod telegram;

// Re-export commonly used types for convenience
pub use self::core::{config, AppError};
pub use self::speech::SpeechClient;
pub use self::storage::{create_pool, get_connection, DbConnection, DbPool};
