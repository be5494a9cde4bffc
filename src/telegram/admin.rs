//! Admin functionality for the Telegram bot
//!
//! This module contains all admin-related commands and utilities:
//! - Global statistics (/stats)
//! - User management (/users, /grant, /trial, /revoke, /deluser)
//!
//! Every handler re-checks `is_admin` at the point of use: a replayed
//! callback or forwarded command must not reach a privileged action.

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::core::config;
use crate::core::config::admin::ADMIN_IDS;
use crate::core::premium::{self, ActivatedBy, PlanType};
use crate::storage::db::{self, get_connection, DbPool};
use crate::telegram::markdown::escape_markdown;

/// Maximum message length for Telegram (with margin)
const MAX_MESSAGE_LENGTH: usize = 4000;

/// Check if user is admin
pub fn is_admin(user_id: i64) -> bool {
    ADMIN_IDS.contains(&user_id)
}

async fn deny_non_admin(bot: &Bot, chat_id: ChatId, user_id: i64, command: &str) -> ResponseResult<()> {
    log::warn!("Unauthorized access attempt: user {} tried {}", user_id, command);
    bot.send_message(chat_id, "❌ У тебя нет прав для выполнения этой команды.")
        .await?;
    Ok(())
}

/// Handle /stats command - show global bot statistics (admin only)
pub async fn handle_stats_command(bot: &Bot, chat_id: ChatId, user_id: i64, db_pool: Arc<DbPool>) -> Result<()> {
    if !is_admin(user_id) {
        deny_non_admin(bot, chat_id, user_id, "/stats").await?;
        return Ok(());
    }

    let conn = get_connection(&db_pool)?;
    let stats = db::get_global_stats(&conn)?;

    let text = format!(
        "📊 *Статистика бота*\n\n\
        👥 Всего пользователей: {}\n\
        ⭐ С премиумом: {}\n\
        🔥 Активных за сутки: {}\n\
        🔤 Символов озвучено: {}",
        stats.total_users, stats.premium_users, stats.active_today, stats.total_chars
    );

    bot.send_message(chat_id, text).parse_mode(ParseMode::MarkdownV2).await?;
    Ok(())
}

/// Handle /users command - show list of all users (admin only)
pub async fn handle_users_command(bot: &Bot, chat_id: ChatId, user_id: i64, db_pool: Arc<DbPool>) -> Result<()> {
    if !is_admin(user_id) {
        deny_non_admin(bot, chat_id, user_id, "/users").await?;
        return Ok(());
    }

    let conn = get_connection(&db_pool)?;
    let users = db::get_all_users(&conn)?;

    if users.is_empty() {
        bot.send_message(
            chat_id,
            "👥 *Список пользователей*\n\nВ базе данных пока нет пользователей\\.",
        )
        .parse_mode(ParseMode::MarkdownV2)
        .await?;
        return Ok(());
    }

    let premium_count = users.iter().filter(|u| u.is_premium).count();
    let cloned_count = users.iter().filter(|u| u.voice_cloned).count();

    let mut text = format!(
        "👥 *Список пользователей* \\(всего\\: {}\\)\n\n\
        📊 Статистика:\n\
        • ⭐ С премиумом: {}\n\
        • 🎤 С клонированным голосом: {}\n\n\
        ━━━━━━━━━━━━━━━━━━━━\n\n",
        users.len(),
        premium_count,
        cloned_count
    );

    let mut users_added = 0;

    for (idx, user) in users.iter().enumerate() {
        let username_str = user
            .username
            .as_ref()
            .map(|u| format!("@{}", escape_markdown(u)))
            .unwrap_or_else(|| format!("ID\\: {}", user.telegram_id));

        let plan_marker = if user.is_premium {
            match user.plan_type.as_deref() {
                Some("trial") => "🎁 trial",
                _ => "⭐ premium",
            }
        } else {
            "🌟 free"
        };

        let voice_marker = if user.voice_cloned { " 🎤" } else { "" };

        let expires_info = match (&user.expires_at, user.is_premium) {
            (Some(expires_at), true) => {
                let date_part = expires_at.split(' ').next().unwrap_or(expires_at);
                format!(" до {}", escape_markdown(date_part))
            }
            _ => String::new(),
        };

        let user_line = format!(
            "{}\\. {} {}{}{}\n",
            idx + 1,
            username_str,
            plan_marker,
            expires_info,
            voice_marker
        );

        // Check if adding this line would exceed the limit
        if text.len() + user_line.len() > MAX_MESSAGE_LENGTH {
            text.push_str(&format!("\n\\.\\.\\. и еще {} пользователей", users.len() - users_added));
            break;
        }

        text.push_str(&user_line);
        users_added += 1;
    }

    bot.send_message(chat_id, text).parse_mode(ParseMode::MarkdownV2).await?;
    Ok(())
}

/// Handle /grant command - activate premium for a user (admin only)
///
/// Usage: `/grant <user_id> [days]`; days defaults to PREMIUM_DAYS.
pub async fn handle_grant_command(
    bot: &Bot,
    chat_id: ChatId,
    admin_id: i64,
    message_text: &str,
    db_pool: Arc<DbPool>,
) -> Result<()> {
    if !is_admin(admin_id) {
        deny_non_admin(bot, chat_id, admin_id, "/grant").await?;
        return Ok(());
    }

    let parts: Vec<&str> = message_text.split_whitespace().collect();
    if parts.len() < 2 {
        bot.send_message(
            chat_id,
            "❌ Использование: /grant <user_id> [days]\n\n\
            Примеры:\n\
            • /grant 123456789 - премиум на стандартный срок\n\
            • /grant 123456789 90 - премиум на 90 дней",
        )
        .await?;
        return Ok(());
    }

    let target_id = match parts[1].parse::<i64>() {
        Ok(id) => id,
        Err(_) => {
            bot.send_message(chat_id, "❌ Неверный формат user_id. Используй числовой ID.")
                .await?;
            return Ok(());
        }
    };

    let days = if parts.len() >= 3 {
        match parts[2].parse::<i64>() {
            Ok(d) if d > 0 => d,
            _ => {
                bot.send_message(chat_id, "❌ Количество дней должно быть положительным числом.")
                    .await?;
                return Ok(());
            }
        }
    } else {
        *config::premium::PREMIUM_DAYS
    };

    let conn = get_connection(&db_pool)?;
    if db::get_user(&conn, target_id)?.is_none() {
        bot.send_message(chat_id, "❌ Пользователь не найден. Он должен сначала написать боту.")
            .await?;
        return Ok(());
    }

    premium::activate(&conn, target_id, days, PlanType::Premium, ActivatedBy::Admin(admin_id))?;

    bot.send_message(
        chat_id,
        format!("✅ Премиум активирован для {} на {} дней.", target_id, days),
    )
    .await?;

    // Notify the user about the granted plan
    if let Err(e) = bot
        .send_message(
            ChatId(target_id),
            format!(
                "🎉 Тебе активирован план ⭐ Premium на {} дней!\n\n\
                • {} символов\n\
                • {} смены голоса",
                days,
                *config::premium::MONTHLY_CHARS,
                *config::premium::MAX_VOICE_CLONES
            ),
        )
        .await
    {
        log::warn!("Failed to notify user {} about premium grant: {}", target_id, e);
    }

    Ok(())
}

/// Handle /trial command - activate a trial plan for a user (admin only)
pub async fn handle_trial_command(
    bot: &Bot,
    chat_id: ChatId,
    admin_id: i64,
    message_text: &str,
    db_pool: Arc<DbPool>,
) -> Result<()> {
    if !is_admin(admin_id) {
        deny_non_admin(bot, chat_id, admin_id, "/trial").await?;
        return Ok(());
    }

    let parts: Vec<&str> = message_text.split_whitespace().collect();
    let target_id = match parts.get(1).and_then(|p| p.parse::<i64>().ok()) {
        Some(id) => id,
        None => {
            bot.send_message(chat_id, "❌ Использование: /trial <user_id>").await?;
            return Ok(());
        }
    };

    let conn = get_connection(&db_pool)?;
    if db::get_user(&conn, target_id)?.is_none() {
        bot.send_message(chat_id, "❌ Пользователь не найден. Он должен сначала написать боту.")
            .await?;
        return Ok(());
    }

    let days = *config::premium::TRIAL_DAYS;
    premium::activate(&conn, target_id, days, PlanType::Trial, ActivatedBy::Admin(admin_id))?;

    bot.send_message(chat_id, format!("✅ Trial активирован для {} на {} дней.", target_id, days))
        .await?;

    if let Err(e) = bot
        .send_message(
            ChatId(target_id),
            format!("🎁 Тебе активирован пробный план на {} дней - озвучка без лимитов!", days),
        )
        .await
    {
        log::warn!("Failed to notify user {} about trial grant: {}", target_id, e);
    }

    Ok(())
}

/// Handle /revoke command - deactivate a user's premium (admin only)
pub async fn handle_revoke_command(
    bot: &Bot,
    chat_id: ChatId,
    admin_id: i64,
    message_text: &str,
    db_pool: Arc<DbPool>,
) -> Result<()> {
    if !is_admin(admin_id) {
        deny_non_admin(bot, chat_id, admin_id, "/revoke").await?;
        return Ok(());
    }

    let parts: Vec<&str> = message_text.split_whitespace().collect();
    let target_id = match parts.get(1).and_then(|p| p.parse::<i64>().ok()) {
        Some(id) => id,
        None => {
            bot.send_message(chat_id, "❌ Использование: /revoke <user_id>").await?;
            return Ok(());
        }
    };

    let conn = get_connection(&db_pool)?;
    premium::deactivate(&conn, target_id)?;

    bot.send_message(chat_id, format!("✅ Премиум деактивирован для {}.", target_id))
        .await?;
    Ok(())
}

/// Handle /deluser command - hard-delete a user record (admin only)
///
/// Escape hatch: user records are never deleted in the normal flow.
pub async fn handle_deluser_command(
    bot: &Bot,
    chat_id: ChatId,
    admin_id: i64,
    message_text: &str,
    db_pool: Arc<DbPool>,
) -> Result<()> {
    if !is_admin(admin_id) {
        deny_non_admin(bot, chat_id, admin_id, "/deluser").await?;
        return Ok(());
    }

    let parts: Vec<&str> = message_text.split_whitespace().collect();
    let target_id = match parts.get(1).and_then(|p| p.parse::<i64>().ok()) {
        Some(id) => id,
        None => {
            bot.send_message(chat_id, "❌ Использование: /deluser <user_id>").await?;
            return Ok(());
        }
    };

    let conn = get_connection(&db_pool)?;
    let deleted = db::delete_user(&conn, target_id)?;

    if deleted {
        log::info!("Admin {} deleted user record {}", admin_id, target_id);
        bot.send_message(chat_id, format!("✅ Пользователь {} удален.", target_id))
            .await?;
    } else {
        bot.send_message(chat_id, "❌ Пользователь не найден.").await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_admin() {
        if !ADMIN_IDS.is_empty() {
            let admin_id = ADMIN_IDS[0];
            let non_admin_id = ADMIN_IDS.iter().max().copied().unwrap_or(0) + 1;
            assert!(is_admin(admin_id));
            assert!(!is_admin(non_admin_id));
        } else {
            assert!(!is_admin(0));
        }
    }
}
