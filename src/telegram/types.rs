//! Handler types, dependencies, and user helpers

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::Message;

use crate::speech::SpeechClient;
use crate::storage::db;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<db::DbPool>,
    pub speech: Arc<SpeechClient>,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(db_pool: Arc<db::DbPool>, speech: Arc<SpeechClient>) -> Self {
        Self { db_pool, speech }
    }
}

/// User info extracted from an incoming message
#[derive(Clone)]
pub struct UserInfo {
    pub chat_id: ChatId,
    pub user_id: i64,
    pub username: Option<String>,
    pub full_name: Option<String>,
}

impl UserInfo {
    /// Extract user info from a Telegram message
    pub fn from_message(msg: &Message) -> Self {
        let user_id = msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()).unwrap_or(0);
        Self {
            chat_id: msg.chat.id,
            user_id,
            username: msg.from.as_ref().and_then(|u| u.username.clone()),
            full_name: msg.from.as_ref().map(|u| u.full_name()),
        }
    }
}
