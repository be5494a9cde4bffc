//! Handlers for the commands in the `Command` enum

use teloxide::prelude::*;

use crate::core::config;
use crate::core::entitlement::Limits;
use crate::storage::db::{self, get_connection};
use crate::telegram::admin;
use crate::telegram::menu;
use crate::telegram::notifications::notify_admin_new_user;
use crate::telegram::types::{HandlerDeps, HandlerError, UserInfo};

const STORAGE_RETRY_MESSAGE: &str = "⚠️ Временная ошибка хранилища. Попробуй еще раз через минуту.";

/// Handle /start - greet the user, create the record on first contact
pub async fn handle_start_command(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let info = UserInfo::from_message(&msg);
    if info.user_id == 0 {
        return Ok(());
    }

    let conn = match get_connection(&deps.db_pool) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to get DB connection in /start: {}", e);
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
            return Ok(());
        }
    };

    let existed = match db::get_user(&conn, info.user_id) {
        Ok(user) => user.is_some(),
        Err(e) => {
            log::error!("Failed to read user {} in /start: {}", info.user_id, e);
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
            return Ok(());
        }
    };

    if let Err(e) = db::get_or_create_user(&conn, info.user_id, info.username.as_deref(), info.full_name.as_deref()) {
        log::error!("Failed to create user {}: {}", info.user_id, e);
        bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
        return Ok(());
    }

    if !existed {
        let bot_clone = bot.clone();
        let user_id = info.user_id;
        let username = info.username.clone();
        let full_name = info.full_name.clone();
        tokio::spawn(async move {
            notify_admin_new_user(&bot_clone, user_id, username.as_deref(), full_name.as_deref()).await;
        });
    }

    let first_name = msg
        .from
        .as_ref()
        .map(|u| u.first_name.clone())
        .unwrap_or_else(|| "друг".to_string());

    let welcome = format!(
        "👋 Привет, {}!\n\n\
        Я умею клонировать твой голос и озвучивать им любой текст.\n\n\
        Как начать:\n\
        1. Отправь голосовое сообщение ({}-{} секунд) - я клонирую голос\n\
        2. Отправь текст - я озвучу его твоим голосом\n\n\
        Бесплатно: {} запроса, до {} символов каждый.",
        first_name,
        *config::limits::MIN_SAMPLE_SECS,
        *config::limits::MAX_SAMPLE_SECS,
        *config::limits::MAX_FREE_TRIALS,
        *config::limits::MAX_CHARS_PER_REQUEST
    );

    bot.send_message(info.chat_id, welcome)
        .reply_markup(menu::main_keyboard())
        .await?;

    Ok(())
}

/// Handle /help - short usage reference
pub async fn handle_help_command(bot: Bot, msg: Message) -> Result<(), HandlerError> {
    bot.send_message(
        msg.chat.id,
        format!(
            "ℹ️ Справка\n\n\
            🎤 Голосовое сообщение ({}-{} сек) - клонировать голос\n\
            📝 Любой текст - озвучить твоим голосом\n\
            /account - лимиты и статус\n\
            /premium - подписка\n\n\
            Бесплатный тариф: один голос, {} символов всего.",
            *config::limits::MIN_SAMPLE_SECS,
            *config::limits::MAX_SAMPLE_SECS,
            *config::limits::FREE_CHAR_LIMIT_TOTAL
        ),
    )
    .await?;
    Ok(())
}

/// Handle /account - show the user's usage and plan card
pub async fn handle_account_command(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let info = UserInfo::from_message(&msg);
    if info.user_id == 0 {
        return Ok(());
    }

    let conn = match get_connection(&deps.db_pool) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to get DB connection in /account: {}", e);
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
            return Ok(());
        }
    };

    match db::get_or_create_user(&conn, info.user_id, info.username.as_deref(), info.full_name.as_deref()) {
        Ok(user) => {
            menu::show_account(&bot, info.chat_id, &user, &Limits::from_env()).await?;
        }
        Err(e) => {
            log::error!("Failed to read user {} in /account: {}", info.user_id, e);
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
        }
    }

    Ok(())
}

/// Handle /premium - show the subscription card
pub async fn handle_premium_command(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let info = UserInfo::from_message(&msg);
    if info.user_id == 0 {
        return Ok(());
    }

    let conn = match get_connection(&deps.db_pool) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to get DB connection in /premium: {}", e);
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
            return Ok(());
        }
    };

    match db::get_or_create_user(&conn, info.user_id, info.username.as_deref(), info.full_name.as_deref()) {
        Ok(user) => {
            menu::show_premium_info(&bot, info.chat_id, &user).await?;
        }
        Err(e) => {
            log::error!("Failed to read user {} in /premium: {}", info.user_id, e);
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
        }
    }

    Ok(())
}

/// Handle /stats - admin-only global statistics
pub async fn handle_stats_command(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let info = UserInfo::from_message(&msg);
    if let Err(e) = admin::handle_stats_command(&bot, info.chat_id, info.user_id, deps.db_pool.clone()).await {
        log::error!("/stats handler failed for user {}: {}", info.user_id, e);
    }
    Ok(())
}

/// Handle /users - admin-only user list
pub async fn handle_users_command(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let info = UserInfo::from_message(&msg);
    if let Err(e) = admin::handle_users_command(&bot, info.chat_id, info.user_id, deps.db_pool.clone()).await {
        log::error!("/users handler failed for user {}: {}", info.user_id, e);
    }
    Ok(())
}
