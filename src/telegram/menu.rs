//! Keyboards and information cards
//!
//! Reply keyboard for the main menu, inline keyboards for premium payment,
//! and the /account and /premium cards.

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, ParseMode};
use url::Url;

use crate::core::config;
use crate::core::entitlement::Limits;
use crate::storage::db::User;
use crate::telegram::markdown::escape_markdown;

/// Main menu button labels (matched verbatim by the text handler)
pub const BTN_CLONE: &str = "🎤 Клонировать голос";
pub const BTN_SYNTH: &str = "📝 Озвучить текст";
pub const BTN_ACCOUNT: &str = "ℹ️ Мой аккаунт";
pub const BTN_CHANNELS: &str = "🔗 Наши каналы";

/// Callback data of the premium refresh button
pub const PREMIUM_REFRESH_CALLBACK: &str = "premium:refresh";

/// Formats a stored SQLite datetime ("2025-12-03 01:29:24") as "03.12.2025".
fn format_date(raw: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|_| raw.split(' ').next().unwrap_or(raw).to_string())
}

/// Builds the persistent reply keyboard shown after /start.
pub fn main_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_CLONE), KeyboardButton::new(BTN_SYNTH)],
        vec![KeyboardButton::new(BTN_ACCOUNT), KeyboardButton::new(BTN_CHANNELS)],
    ])
    .resize_keyboard()
}

/// Builds the premium payment keyboard (payment channel + status refresh).
pub fn payment_keyboard() -> InlineKeyboardMarkup {
    let mut rows = Vec::new();

    if let Ok(url) = Url::parse(&format!("https://t.me/{}", *config::premium::PAYMENT_CHANNEL)) {
        rows.push(vec![InlineKeyboardButton::url("💳 Перейти к оплате".to_string(), url)]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "🔄 Обновить статус".to_string(),
        PREMIUM_REFRESH_CALLBACK,
    )]);

    InlineKeyboardMarkup::new(rows)
}

/// Renders the /account card for a freshly-read user row.
pub fn account_text(user: &User, limits: &Limits) -> String {
    let mut text = "ℹ️ *Твой аккаунт*\n\n".to_string();

    let voice_line = match (&user.voice_id, user.voice_cloned) {
        (Some(_), _) => {
            let status = user.voice_status.as_deref().unwrap_or("active");
            format!("🎤 Голос: клонирован \\({}\\)\n", escape_markdown(status))
        }
        (None, _) => "🎤 Голос: не клонирован\n".to_string(),
    };
    text.push_str(&voice_line);

    if user.is_premium {
        let plan_name = match user.plan_type.as_deref() {
            Some("trial") => "Trial",
            _ => "Premium",
        };
        text.push_str(&format!("⭐ План: {}\n", plan_name));

        if let Some(ref expires_at) = user.expires_at {
            text.push_str(&format!("📅 Действует до: {}\n", escape_markdown(&format_date(expires_at))));
        }

        if user.has_metered_premium() {
            text.push_str(&format!(
                "🔤 Остаток символов: {} из {}\n",
                user.remaining_chars, user.total_chars
            ));
        } else {
            text.push_str("🔤 Символы: без ограничений на время trial\n");
        }

        text.push_str(&format!(
            "🎙 Смены голоса: {} из {}\n",
            user.voice_clones_used, user.max_voice_clones
        ));
    } else {
        text.push_str("🌟 План: Free\n");

        let remaining = (limits.free_char_limit_total - user.chars_used).max(0);
        text.push_str(&format!(
            "🔤 Остаток символов: {} из {}\n",
            remaining, limits.free_char_limit_total
        ));
        if limits.max_free_trials > 0 {
            let requests_left = (limits.max_free_trials - user.request_count).max(0);
            text.push_str(&format!(
                "📨 Осталось запросов: {} из {}\n",
                requests_left, limits.max_free_trials
            ));
        }
        text.push_str(&format!(
            "✂️ Максимум символов в запросе: {}\n",
            limits.max_chars_per_request
        ));
    }

    text.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    text.push_str("💫 Больше символов и смен голоса \\- /premium");
    text
}

/// Renders the /premium card.
pub fn premium_text(user: &User) -> String {
    let mut text = "💳 *Подписка*\n\n".to_string();

    if user.is_premium {
        let plan_name = match user.plan_type.as_deref() {
            Some("trial") => "Trial",
            _ => "Premium",
        };
        text.push_str(&format!("✅ *У тебя активен план {}\\!*\n", plan_name));
        if let Some(ref expires_at) = user.expires_at {
            text.push_str(&format!("📅 Действует до: {}\n", escape_markdown(&format_date(expires_at))));
        }
        if user.has_metered_premium() {
            text.push_str(&format!("🔤 Остаток символов: {}\n", user.remaining_chars));
        }
    } else {
        text.push_str("📊 *Твой текущий план:* 🌟 Free\n\n");
        text.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
        text.push_str("⭐ *Premium дает:*\n");
        text.push_str(&format!("• {} символов в месяц\n", *config::premium::MONTHLY_CHARS));
        text.push_str(&format!("• {} смены голоса\n", *config::premium::MAX_VOICE_CLONES));
        text.push_str("• Озвучка без лимита запросов\n\n");
        text.push_str("Оплата через канал \\- после оплаты администратор активирует план\\.");
    }

    text
}

/// Sends the /account card.
pub async fn show_account(bot: &Bot, chat_id: ChatId, user: &User, limits: &Limits) -> ResponseResult<Message> {
    bot.send_message(chat_id, account_text(user, limits))
        .parse_mode(ParseMode::MarkdownV2)
        .await
}

/// Sends the /premium card with the payment keyboard.
pub async fn show_premium_info(bot: &Bot, chat_id: ChatId, user: &User) -> ResponseResult<Message> {
    bot.send_message(chat_id, premium_text(user))
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(payment_keyboard())
        .await
}
