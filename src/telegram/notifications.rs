use teloxide::prelude::*;

use crate::core::config::admin::ADMIN_USER_ID;

/// Sends a plain-text notification to the administrator.
///
/// Failures are logged and swallowed: a broken admin chat must never break
/// the user-facing flow that triggered the notification.
pub async fn notify_admin_text(bot: &Bot, text: &str) {
    let admin_id = *ADMIN_USER_ID;
    if admin_id == 0 {
        log::debug!("ADMIN_USER_ID not configured, skipping admin notification");
        return;
    }

    if let Err(e) = bot.send_message(ChatId(admin_id), text).await {
        log::error!("Failed to send admin notification: {}", e);
    }
}

/// Notifies the administrator about a first-time user.
pub async fn notify_admin_new_user(bot: &Bot, user_id: i64, username: Option<&str>, full_name: Option<&str>) {
    let who = match (username, full_name) {
        (Some(u), _) => format!("@{}", u),
        (None, Some(n)) => n.to_string(),
        (None, None) => "без имени".to_string(),
    };

    notify_admin_text(
        bot,
        &format!("👋 Новый пользователь: {} (ID: {})", who, user_id),
    )
    .await;
}

/// Notifies the administrator about a provider failure worth looking at.
pub async fn notify_admin_provider_failure(bot: &Bot, user_id: i64, context: &str, error: &str) {
    notify_admin_text(
        bot,
        &format!(
            "⚠️ Ошибка провайдера\nuser_id: {}\nоперация: {}\nошибка: {}",
            user_id, context, error
        ),
    )
    .await;
}
