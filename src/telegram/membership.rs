//! Channel-membership gate
//!
//! Before cloning or synthesis the user must be subscribed to every
//! configured channel. The check is read-only; rendering the join prompt
//! is the caller's side of the contract.

use teloxide::prelude::*;
use teloxide::types::{ChatMemberStatus, InlineKeyboardButton, InlineKeyboardMarkup, Recipient, UserId};
use url::Url;

use crate::core::config;

/// Callback data of the "I have subscribed" button
pub const VERIFY_CALLBACK: &str = "membership:verify";

/// Result of a membership check across all required channels
#[derive(Debug, Clone, Default)]
pub struct MembershipCheck {
    /// Channels (without @) the user is not a member of
    pub missing: Vec<String>,
}

impl MembershipCheck {
    pub fn allowed(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Normalizes a channel reference to a bare name (no @, no t.me prefix).
pub fn normalize_channel(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("https://t.me/")
        .or_else(|| trimmed.strip_prefix("t.me/"))
        .unwrap_or(trimmed);
    trimmed.trim_start_matches('@').to_string()
}

fn status_satisfies(status: &ChatMemberStatus) -> bool {
    matches!(
        status,
        ChatMemberStatus::Owner | ChatMemberStatus::Administrator | ChatMemberStatus::Member
    )
}

/// Checks the user's membership in every required channel.
///
/// `Left`, `Banned`, `Restricted` and query failures all count as missing:
/// a misconfigured channel id must fail closed, not silently open the bot.
/// Skipped entirely (no API calls) when the channel list is empty.
pub async fn check_membership(bot: &Bot, user_id: i64, channels: &[String]) -> MembershipCheck {
    let mut missing = Vec::new();

    for channel in channels {
        let name = normalize_channel(channel);
        if name.is_empty() {
            continue;
        }

        let recipient = Recipient::ChannelUsername(format!("@{}", name));
        match bot.get_chat_member(recipient, UserId(user_id as u64)).await {
            Ok(member) => {
                if !status_satisfies(&member.status()) {
                    missing.push(name);
                }
            }
            Err(e) => {
                log::error!("Error checking membership for @{}: {}", name, e);
                missing.push(name);
            }
        }
    }

    MembershipCheck { missing }
}

/// Builds the join-prompt keyboard: one URL button per missing channel plus
/// the verification button.
pub fn join_keyboard(missing: &[String]) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();

    for channel in missing {
        if let Ok(url) = Url::parse(&format!("https://t.me/{}", channel)) {
            rows.push(vec![InlineKeyboardButton::url(format!("➡️ Подписаться на @{}", channel), url)]);
        }
    }

    rows.push(vec![InlineKeyboardButton::callback(
        "✅ Я подписался".to_string(),
        VERIFY_CALLBACK,
    )]);

    InlineKeyboardMarkup::new(rows)
}

/// Sends the join prompt listing the missing channels.
pub async fn send_join_prompt(bot: &Bot, chat_id: ChatId, missing: &[String]) -> ResponseResult<()> {
    let channels_list = missing
        .iter()
        .map(|c| format!("➡️ @{}", c))
        .collect::<Vec<_>>()
        .join("\n");

    bot.send_message(
        chat_id,
        format!(
            "✋ Для использования бота подпишись на наши каналы:\n\n{}\n\nПосле подписки нажми «Я подписался».",
            channels_list
        ),
    )
    .reply_markup(join_keyboard(missing))
    .await?;

    Ok(())
}

/// Gate helper for handlers: checks membership and renders the prompt on
/// failure. Returns `true` when the user may proceed.
pub async fn gate_or_prompt(bot: &Bot, chat_id: ChatId, user_id: i64) -> ResponseResult<bool> {
    let channels = &*config::channels::REQUIRED_CHANNELS;
    if channels.is_empty() {
        return Ok(true);
    }

    let check = check_membership(bot, user_id, channels).await;
    if check.allowed() {
        return Ok(true);
    }

    send_join_prompt(bot, chat_id, &check.missing).await?;
    Ok(false)
}
