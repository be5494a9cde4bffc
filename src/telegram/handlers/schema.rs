//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::commands::{
    handle_account_command, handle_help_command, handle_premium_command, handle_start_command, handle_stats_command,
    handle_users_command,
};
use super::text::handle_text_message;
use super::voice::handle_voice_message;
use crate::storage::db::{self, get_connection};
use crate::telegram::admin;
use crate::telegram::bot::Command;
use crate::telegram::broadcast::handle_broadcast_command;
use crate::telegram::membership;
use crate::telegram::menu;
use crate::telegram::types::{HandlerDeps, HandlerError};

/// Creates the main dispatcher schema for the Telegram bot.
///
/// This function returns a handler tree that can be used with teloxide's
/// Dispatcher. The same schema is used in production and in integration
/// tests.
///
/// # Arguments
/// * `deps` - Handler dependencies (database pool, speech client)
///
/// # Returns
/// The complete handler tree for the bot
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_grant = deps.clone();
    let deps_trial = deps.clone();
    let deps_revoke = deps.clone();
    let deps_deluser = deps.clone();
    let deps_broadcast = deps.clone();
    let deps_commands = deps.clone();
    let deps_voice = deps.clone();
    let deps_text = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        // Hidden admin commands (not in Command enum)
        .branch(grant_handler(deps_grant))
        .branch(trial_handler(deps_trial))
        .branch(revoke_handler(deps_revoke))
        .branch(deluser_handler(deps_deluser))
        .branch(broadcast_handler(deps_broadcast))
        // Command handler
        .branch(command_handler(deps_commands))
        // Voice sample handler (clone flow)
        .branch(voice_handler(deps_voice))
        // Message handler for text and menu buttons
        .branch(message_handler(deps_text))
        // Callback query handler
        .branch(callback_handler(deps_callback))
}

fn text_command_filter(msg: &Message, prefix: &str) -> bool {
    msg.text().map(|text| text.starts_with(prefix)).unwrap_or(false)
}

fn sender_id(msg: &Message) -> i64 {
    msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()).unwrap_or(0)
}

/// Handler for /grant admin command (hidden, not in Command enum)
fn grant_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| text_command_filter(&msg, "/grant"))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let user_id = sender_id(&msg);
                let message_text = msg.text().unwrap_or_default();

                if let Err(e) =
                    admin::handle_grant_command(&bot, msg.chat.id, user_id, message_text, deps.db_pool.clone()).await
                {
                    log::error!("/grant handler failed for user {}: {}", user_id, e);
                    let _ = bot.send_message(msg.chat.id, format!("❌ /grant failed: {}", e)).await;
                }
                Ok(())
            }
        })
}

/// Handler for /trial admin command (hidden, not in Command enum)
fn trial_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| text_command_filter(&msg, "/trial"))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let user_id = sender_id(&msg);
                let message_text = msg.text().unwrap_or_default();

                if let Err(e) =
                    admin::handle_trial_command(&bot, msg.chat.id, user_id, message_text, deps.db_pool.clone()).await
                {
                    log::error!("/trial handler failed for user {}: {}", user_id, e);
                    let _ = bot.send_message(msg.chat.id, format!("❌ /trial failed: {}", e)).await;
                }
                Ok(())
            }
        })
}

/// Handler for /revoke admin command (hidden, not in Command enum)
fn revoke_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| text_command_filter(&msg, "/revoke"))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let user_id = sender_id(&msg);
                let message_text = msg.text().unwrap_or_default();

                if let Err(e) =
                    admin::handle_revoke_command(&bot, msg.chat.id, user_id, message_text, deps.db_pool.clone()).await
                {
                    log::error!("/revoke handler failed for user {}: {}", user_id, e);
                    let _ = bot.send_message(msg.chat.id, format!("❌ /revoke failed: {}", e)).await;
                }
                Ok(())
            }
        })
}

/// Handler for /deluser admin command (hidden, not in Command enum)
fn deluser_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| text_command_filter(&msg, "/deluser"))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let user_id = sender_id(&msg);
                let message_text = msg.text().unwrap_or_default();

                if let Err(e) =
                    admin::handle_deluser_command(&bot, msg.chat.id, user_id, message_text, deps.db_pool.clone()).await
                {
                    log::error!("/deluser handler failed for user {}: {}", user_id, e);
                    let _ = bot.send_message(msg.chat.id, format!("❌ /deluser failed: {}", e)).await;
                }
                Ok(())
            }
        })
}

/// Handler for /broadcast admin command (hidden, not in Command enum)
fn broadcast_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| text_command_filter(&msg, "/broadcast"))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let user_id = sender_id(&msg);
                let message_text = msg.text().unwrap_or_default();

                if let Err(e) =
                    handle_broadcast_command(&bot, msg.chat.id, user_id, message_text, deps.db_pool.clone()).await
                {
                    log::error!("/broadcast handler failed for user {}: {}", user_id, e);
                    let _ = bot
                        .send_message(msg.chat.id, format!("❌ /broadcast failed: {}", e))
                        .await;
                }
                Ok(())
            }
        })
}

/// Handler for the commands in the Command enum
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter_command::<Command>()
        .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                match cmd {
                    Command::Start => handle_start_command(bot, msg, deps).await,
                    Command::Help => handle_help_command(bot, msg).await,
                    Command::Account => handle_account_command(bot, msg, deps).await,
                    Command::Premium => handle_premium_command(bot, msg, deps).await,
                    Command::Stats => handle_stats_command(bot, msg, deps).await,
                    Command::Users => handle_users_command(bot, msg, deps).await,
                }
            }
        })
}

/// Handler for voice samples (clone flow)
fn voice_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.voice().is_some() || msg.audio().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move { handle_voice_message(bot, msg, deps).await }
        })
}

/// Handler for plain text messages (menu buttons + synthesis flow)
fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move { handle_text_message(bot, msg, deps).await }
        })
}

/// Handler for callback queries (membership verification, premium refresh)
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            if let Err(e) = handle_callback(&bot, &q, &deps).await {
                log::error!("Callback handler failed: {}", e);
            }
            Ok(())
        }
    })
}

async fn handle_callback(bot: &Bot, q: &CallbackQuery, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let data = q.data.as_deref().unwrap_or_default();
    let user_id = i64::try_from(q.from.id.0).unwrap_or(0);

    match data {
        membership::VERIFY_CALLBACK => {
            let channels = &*crate::core::config::channels::REQUIRED_CHANNELS;
            let check = membership::check_membership(bot, user_id, channels).await;

            if check.allowed() {
                bot.answer_callback_query(q.id.clone())
                    .text("✅ Подписка подтверждена! Можешь пользоваться ботом.")
                    .show_alert(true)
                    .await?;

                if let Some(message) = q.message.as_ref().and_then(|m| m.regular_message()) {
                    let _ = bot.delete_message(message.chat.id, message.id).await;
                }
            } else {
                bot.answer_callback_query(q.id.clone())
                    .text("❌ Подписка еще не оформлена.")
                    .await?;

                if let Some(message) = q.message.as_ref().and_then(|m| m.regular_message()) {
                    let channels_list = check
                        .missing
                        .iter()
                        .map(|c| format!("➡️ @{}", c))
                        .collect::<Vec<_>>()
                        .join("\n");
                    let _ = bot
                        .edit_message_text(
                            message.chat.id,
                            message.id,
                            format!("❌ Ты еще не подписан на:\n\n{}", channels_list),
                        )
                        .reply_markup(membership::join_keyboard(&check.missing))
                        .await;
                }
            }
        }
        menu::PREMIUM_REFRESH_CALLBACK => {
            bot.answer_callback_query(q.id.clone()).await?;

            let conn = match get_connection(&deps.db_pool) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("Failed to get DB connection in premium refresh: {}", e);
                    return Ok(());
                }
            };

            // Lazy expiry is applied by the read, so the card is always fresh
            let user = match db::get_or_create_user(&conn, user_id, None, None) {
                Ok(user) => user,
                Err(e) => {
                    log::error!("Failed to read user {} in premium refresh: {}", user_id, e);
                    return Ok(());
                }
            };

            if let Some(message) = q.message.as_ref().and_then(|m| m.regular_message()) {
                let _ = bot
                    .edit_message_text(message.chat.id, message.id, menu::premium_text(&user))
                    .parse_mode(teloxide::types::ParseMode::MarkdownV2)
                    .reply_markup(menu::payment_keyboard())
                    .await;
            }
        }
        other => {
            log::debug!("Unknown callback data: {}", other);
            bot.answer_callback_query(q.id.clone()).await?;
        }
    }

    Ok(())
}
