//! Text → synthesis flow
//!
//! Routes the reply-keyboard buttons, then treats any other text as a
//! synthesis request: gate, provider call, send voice, and only then the
//! atomic usage accounting.

use teloxide::prelude::*;
use teloxide::types::InputFile;

use crate::core::config;
use crate::core::entitlement::{self, Limits, UsageDecision};
use crate::core::premium;
use crate::speech::SpeechError;
use crate::storage::db::{self, get_connection};
use crate::telegram::membership;
use crate::telegram::menu;
use crate::telegram::notifications::notify_admin_provider_failure;
use crate::telegram::types::{HandlerDeps, HandlerError, UserInfo};

const STORAGE_RETRY_MESSAGE: &str = "⚠️ Временная ошибка хранилища. Попробуй еще раз через минуту.";

/// Handle an incoming plain-text message
pub async fn handle_text_message(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let info = UserInfo::from_message(&msg);
    if info.user_id == 0 {
        return Ok(());
    }

    let text = match msg.text() {
        Some(text) => text.trim().to_string(),
        None => return Ok(()),
    };
    if text.is_empty() {
        return Ok(());
    }

    // Unknown slash commands fall through the command branch to here
    if text.starts_with('/') {
        bot.send_message(info.chat_id, "🤔 Не знаю такой команды. Смотри /help.")
            .await?;
        return Ok(());
    }

    // Reply-keyboard buttons
    match text.as_str() {
        menu::BTN_CLONE => {
            bot.send_message(
                info.chat_id,
                format!(
                    "🎤 Отправь голосовое сообщение длиной {}-{} секунд, и я клонирую твой голос.",
                    *config::limits::MIN_SAMPLE_SECS,
                    *config::limits::MAX_SAMPLE_SECS
                ),
            )
            .await?;
            return Ok(());
        }
        menu::BTN_SYNTH => {
            bot.send_message(
                info.chat_id,
                "📝 Отправь текст сообщением, и я озвучу его твоим клонированным голосом.",
            )
            .await?;
            return Ok(());
        }
        menu::BTN_ACCOUNT => {
            return super::commands::handle_account_command(bot, msg, deps).await;
        }
        menu::BTN_CHANNELS => {
            let channels = &*config::channels::REQUIRED_CHANNELS;
            let reply = if channels.is_empty() {
                "🔗 Обязательных каналов нет.".to_string()
            } else {
                let list = channels.iter().map(|c| format!("➡️ @{}", c)).collect::<Vec<_>>().join("\n");
                format!("🔗 Наши каналы:\n\n{}", list)
            };
            bot.send_message(info.chat_id, reply).await?;
            return Ok(());
        }
        _ => {}
    }

    // Channel gate before any quota bookkeeping
    if !membership::gate_or_prompt(&bot, info.chat_id, info.user_id).await? {
        return Ok(());
    }

    let conn = match get_connection(&deps.db_pool) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to get DB connection in text handler: {}", e);
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
            return Ok(());
        }
    };

    let user = match db::get_or_create_user(&conn, info.user_id, info.username.as_deref(), info.full_name.as_deref()) {
        Ok(user) => user,
        Err(e) => {
            // Storage outage is a retryable denial, never "a brand-new free user"
            log::error!("Failed to read user {} in text handler: {}", info.user_id, e);
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
            return Ok(());
        }
    };

    let voice_id = match user.voice_id.clone() {
        Some(voice_id) => voice_id,
        None => {
            bot.send_message(
                info.chat_id,
                format!(
                    "❌ Сначала клонируй голос: отправь голосовое сообщение ({}-{} секунд).",
                    *config::limits::MIN_SAMPLE_SECS,
                    *config::limits::MAX_SAMPLE_SECS
                ),
            )
            .await?;
            return Ok(());
        }
    };

    let limits = Limits::from_env();
    let char_count = text.chars().count() as i64;

    // Per-request ceiling applies to the free tier only
    if !user.is_premium && char_count > limits.max_chars_per_request {
        bot.send_message(
            info.chat_id,
            format!(
                "❌ Слишком длинный текст: {} символов при лимите {} на запрос.",
                char_count, limits.max_chars_per_request
            ),
        )
        .await?;
        return Ok(());
    }

    match entitlement::check_usage(&user, &limits, char_count) {
        UsageDecision::Allow => {}
        UsageDecision::CharLimitExceeded { remaining } => {
            bot.send_message(
                info.chat_id,
                format!(
                    "❌ Текст не помещается в остаток бюджета: осталось {} символов, в тексте {}.\n\n\
                    Больше символов - /premium.",
                    remaining, char_count
                ),
            )
            .await?;
            return Ok(());
        }
        UsageDecision::TrialsExhausted => {
            bot.send_message(
                info.chat_id,
                "❌ Бесплатные запросы закончились.\n\nБезлимитные запросы - /premium.",
            )
            .await?;
            return Ok(());
        }
    }

    let processing_msg = bot.send_message(info.chat_id, "⏳ Озвучиваю...").await?;

    let audio = match deps.speech.synthesize(&text, &voice_id).await {
        Ok(audio) => audio,
        Err(SpeechError::Unavailable(e)) => {
            // Transient: abort without touching any counter
            log::error!("Speech provider unavailable while synthesizing for {}: {}", info.user_id, e);
            notify_admin_provider_failure(&bot, info.user_id, "synthesize", &e).await;
            let _ = bot.delete_message(info.chat_id, processing_msg.id).await;
            bot.send_message(info.chat_id, "⚠️ Сервис озвучки временно недоступен. Попробуй позже.")
                .await?;
            return Ok(());
        }
        Err(SpeechError::Rejected(message)) => {
            log::warn!("Speech provider rejected synthesis for {}: {}", info.user_id, message);
            let _ = bot.delete_message(info.chat_id, processing_msg.id).await;
            bot.send_message(info.chat_id, format!("❌ Ошибка озвучки: {}", message))
                .await?;
            return Ok(());
        }
    };

    bot.send_voice(info.chat_id, InputFile::memory(audio).file_name("golosok.mp3"))
        .await?;

    let _ = bot.delete_message(info.chat_id, processing_msg.id).await;

    // Accounting happens strictly after the synthesis succeeded
    let accounted = if user.is_premium {
        premium::deduct(&conn, &user, char_count)
    } else {
        db::record_usage(&conn, info.user_id, char_count).map(|_| true)
    };

    match accounted {
        Ok(true) => {}
        Ok(false) => {
            // A parallel request drained the budget between the gate and here;
            // the audio is already delivered, so only log the anomaly.
            log::warn!(
                "Premium deduct raced for user {} ({} chars), budget already drained",
                info.user_id,
                char_count
            );
        }
        Err(e) => {
            log::error!("Failed to record usage for user {}: {}", info.user_id, e);
        }
    }

    Ok(())
}
