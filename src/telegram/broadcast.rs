//! Best-effort broadcast to every known user
//!
//! One bad chat id must never abort the whole fan-out: per-recipient
//! failures are collected and reported back to the admin instead.

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;

use crate::storage::db::{self, get_connection, DbPool, User};
use crate::telegram::admin::is_admin;

/// Who receives the broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Premium,
    Free,
}

impl Audience {
    fn matches(&self, user: &User) -> bool {
        match self {
            Audience::All => true,
            Audience::Premium => user.is_premium,
            Audience::Free => !user.is_premium,
        }
    }
}

/// Outcome of a broadcast fan-out
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: Vec<i64>,
}

/// Splits `/broadcast` arguments into an audience selector and the text.
///
/// A leading `premium` or `free` token narrows the audience; everything
/// else is the message body.
fn parse_broadcast_args(args: &str) -> (Audience, &str) {
    let trimmed = args.trim();
    if let Some(rest) = trimmed.strip_prefix("premium ") {
        return (Audience::Premium, rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("free ") {
        return (Audience::Free, rest.trim());
    }
    (Audience::All, trimmed)
}

/// Sends `text` to every user in the audience, continuing past individual
/// failures.
pub async fn broadcast(bot: &Bot, db_pool: &Arc<DbPool>, text: &str, audience: Audience) -> Result<BroadcastReport> {
    let conn = get_connection(db_pool)?;
    let users = db::get_all_users(&conn)?;
    drop(conn);

    let recipients: Vec<i64> = users
        .iter()
        .filter(|u| audience.matches(u))
        .map(|u| u.telegram_id)
        .collect();

    let mut report = BroadcastReport::default();

    for telegram_id in &recipients {
        match bot.send_message(ChatId(*telegram_id), text).await {
            Ok(_) => report.sent += 1,
            Err(e) => {
                log::warn!("Broadcast to {} failed: {}", telegram_id, e);
                report.failed.push(*telegram_id);
            }
        }
    }

    log::info!(
        "Broadcast finished: {} sent, {} failed out of {} recipients ({:?})",
        report.sent,
        report.failed.len(),
        recipients.len(),
        audience
    );

    Ok(report)
}

/// Handle /broadcast command (admin only)
///
/// Usage: `/broadcast [premium|free] <text>` - the rest of the message is
/// sent verbatim to the selected audience.
pub async fn handle_broadcast_command(
    bot: &Bot,
    chat_id: ChatId,
    admin_id: i64,
    message_text: &str,
    db_pool: Arc<DbPool>,
) -> Result<()> {
    if !is_admin(admin_id) {
        log::warn!("Unauthorized access attempt: user {} tried /broadcast", admin_id);
        bot.send_message(chat_id, "❌ У тебя нет прав для выполнения этой команды.")
            .await?;
        return Ok(());
    }

    let args = message_text.strip_prefix("/broadcast").unwrap_or_default();
    let (audience, text) = parse_broadcast_args(args);

    if text.is_empty() {
        bot.send_message(
            chat_id,
            "❌ Использование: /broadcast [premium|free] <текст>\n\n\
            Примеры:\n\
            • /broadcast Привет всем! - всем пользователям\n\
            • /broadcast premium Новый лимит - только премиум-пользователям",
        )
        .await?;
        return Ok(());
    }

    bot.send_message(chat_id, "⏳ Рассылаю сообщение...").await?;

    let report = broadcast(bot, &db_pool, text, audience).await?;

    let mut summary = format!("✅ Рассылка завершена: отправлено {} пользователям.", report.sent);
    if !report.failed.is_empty() {
        summary.push_str(&format!(
            "\n⚠️ Не доставлено {} пользователям: {:?}",
            report.failed.len(),
            report.failed
        ));
    }

    bot.send_message(chat_id, summary).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broadcast_args_default_audience() {
        let (audience, text) = parse_broadcast_args(" Привет всем! ");
        assert_eq!(audience, Audience::All);
        assert_eq!(text, "Привет всем!");
    }

    #[test]
    fn test_parse_broadcast_args_premium() {
        let (audience, text) = parse_broadcast_args("premium Новый лимит");
        assert_eq!(audience, Audience::Premium);
        assert_eq!(text, "Новый лимит");
    }

    #[test]
    fn test_parse_broadcast_args_free() {
        let (audience, text) = parse_broadcast_args("free Попробуй премиум");
        assert_eq!(audience, Audience::Free);
        assert_eq!(text, "Попробуй премиум");
    }

    #[test]
    fn test_premium_word_inside_text_is_not_a_selector() {
        let (audience, text) = parse_broadcast_args("premium");
        // Bare selector with no body is treated as text, the handler will
        // reject it as an empty broadcast anyway
        assert_eq!(audience, Audience::All);
        assert_eq!(text, "premium");
    }
}
