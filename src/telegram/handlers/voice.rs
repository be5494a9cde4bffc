//! Voice-sample upload → clone flow
//!
//! The user sends a voice (or audio) message, we validate the sample length,
//! run the clone gate, call the provider and record the result with a
//! guarded update. Counters are touched only after the provider succeeded.

use teloxide::prelude::*;
use teloxide::types::FileId;

use crate::core::config;
use crate::core::entitlement::{self, CloneDecision};
use crate::speech::SpeechError;
use crate::storage::db::{self, get_connection};
use crate::telegram::membership;
use crate::telegram::notifications::notify_admin_provider_failure;
use crate::telegram::types::{HandlerDeps, HandlerError, UserInfo};

const STORAGE_RETRY_MESSAGE: &str = "⚠️ Временная ошибка хранилища. Попробуй еще раз через минуту.";

/// Downloads a Telegram file into memory via the file URL.
///
/// teloxide's own download helper wants an `AsyncWrite` target; for provider
/// uploads we need plain bytes, so the file URL is fetched directly.
async fn fetch_telegram_file(bot: &Bot, file_id: FileId) -> anyhow::Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;

    let client = reqwest::Client::builder()
        .timeout(config::network::timeout())
        .build()?;

    let url = format!("https://api.telegram.org/file/bot{}/{}", bot.token(), file.path);
    let resp = client.get(url).send().await?;

    if !resp.status().is_success() {
        return Err(anyhow::anyhow!(
            "Telegram file download failed (path={}, status={})",
            file.path,
            resp.status()
        ));
    }

    Ok(resp.bytes().await?.to_vec())
}

/// Handle an incoming voice or audio message: the clone flow
pub async fn handle_voice_message(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let info = UserInfo::from_message(&msg);
    if info.user_id == 0 {
        return Ok(());
    }

    // Channel gate comes first; the prompt carries the join buttons
    if !membership::gate_or_prompt(&bot, info.chat_id, info.user_id).await? {
        return Ok(());
    }

    let (file_id, duration_secs) = match (msg.voice(), msg.audio()) {
        (Some(voice), _) => (voice.file.id.clone(), i64::from(voice.duration.seconds())),
        (None, Some(audio)) => (audio.file.id.clone(), i64::from(audio.duration.seconds())),
        (None, None) => return Ok(()),
    };

    let min_secs = *config::limits::MIN_SAMPLE_SECS;
    let max_secs = *config::limits::MAX_SAMPLE_SECS;
    if duration_secs < min_secs || duration_secs > max_secs {
        bot.send_message(
            info.chat_id,
            format!("❌ Нужен образец голоса длиной {}-{} секунд (у тебя {} сек).", min_secs, max_secs, duration_secs),
        )
        .await?;
        return Ok(());
    }

    let conn = match get_connection(&deps.db_pool) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to get DB connection in voice handler: {}", e);
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
            return Ok(());
        }
    };

    let user = match db::get_or_create_user(&conn, info.user_id, info.username.as_deref(), info.full_name.as_deref()) {
        Ok(user) => user,
        Err(e) => {
            // Storage outage is a retryable denial, never "a brand-new free user"
            log::error!("Failed to read user {} in voice handler: {}", info.user_id, e);
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
            return Ok(());
        }
    };

    match entitlement::check_clone_allowed(&user) {
        CloneDecision::Allow => {}
        CloneDecision::AlreadyCloned => {
            bot.send_message(
                info.chat_id,
                "❌ Твой голос уже клонирован. На бесплатном тарифе голос можно клонировать только один раз.\n\n\
                Сменить голос можно с подпиской - /premium.",
            )
            .await?;
            return Ok(());
        }
        CloneDecision::QuotaReached => {
            bot.send_message(
                info.chat_id,
                format!(
                    "❌ Лимит смен голоса исчерпан ({} из {}).",
                    user.voice_clones_used, user.max_voice_clones
                ),
            )
            .await?;
            return Ok(());
        }
    }

    let processing_msg = bot.send_message(info.chat_id, "⏳ Клонирую голос...").await?;

    let sample = match fetch_telegram_file(&bot, file_id).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Failed to download voice sample for user {}: {}", info.user_id, e);
            let _ = bot.delete_message(info.chat_id, processing_msg.id).await;
            bot.send_message(info.chat_id, "⚠️ Не удалось скачать образец. Попробуй отправить его еще раз.")
                .await?;
            return Ok(());
        }
    };

    let display_name = info
        .full_name
        .clone()
        .or_else(|| info.username.clone())
        .unwrap_or_else(|| format!("Telegram User {}", info.user_id));

    let cloned = match deps.speech.clone_voice(&display_name, sample).await {
        Ok(cloned) => cloned,
        Err(SpeechError::Unavailable(e)) => {
            log::error!("Speech provider unavailable while cloning for {}: {}", info.user_id, e);
            notify_admin_provider_failure(&bot, info.user_id, "clone_voice", &e).await;
            let _ = bot.delete_message(info.chat_id, processing_msg.id).await;
            bot.send_message(info.chat_id, "⚠️ Сервис озвучки временно недоступен. Попробуй позже.")
                .await?;
            return Ok(());
        }
        Err(SpeechError::Rejected(message)) => {
            log::warn!("Speech provider rejected clone for {}: {}", info.user_id, message);
            let _ = bot.delete_message(info.chat_id, processing_msg.id).await;
            bot.send_message(info.chat_id, format!("❌ Не удалось клонировать голос: {}", message))
                .await?;
            return Ok(());
        }
    };

    // Guarded write: the loser of a concurrent double-submission gets `false`
    let recorded = match entitlement::record_clone(&conn, &user, &cloned.voice_id, &cloned.status) {
        Ok(recorded) => recorded,
        Err(e) => {
            log::error!("Failed to record clone for user {}: {}", info.user_id, e);
            let _ = bot.delete_message(info.chat_id, processing_msg.id).await;
            bot.send_message(info.chat_id, STORAGE_RETRY_MESSAGE).await?;
            return Ok(());
        }
    };

    let _ = bot.delete_message(info.chat_id, processing_msg.id).await;

    if !recorded {
        log::warn!("Concurrent clone race lost by request from user {}", info.user_id);
        bot.send_message(info.chat_id, "❌ Голос уже клонирован параллельным запросом.")
            .await?;
        return Ok(());
    }

    let mut reply = "✅ Голос успешно клонирован! Теперь отправь текст, и я озвучу его твоим голосом.".to_string();
    if user.is_premium {
        reply.push_str(&format!(
            "\n\n🎙 Использовано смен голоса: {} из {}.",
            user.voice_clones_used + 1,
            user.max_voice_clones
        ));
    }

    bot.send_message(info.chat_id, reply).await?;
    Ok(())
}
