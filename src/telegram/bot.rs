//! Bot initialization and command definitions
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Command registration in the Telegram UI

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::core::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Я умею:")]
pub enum Command {
    #[command(description = "приветствие и главное меню")]
    Start,
    #[command(description = "краткая справка")]
    Help,
    #[command(description = "информация о твоем аккаунте")]
    Account,
    #[command(description = "подписка и тарифы")]
    Premium,
    #[command(description = "глобальная статистика (только для администратора)")]
    Stats,
    #[command(description = "список всех пользователей (только для администратора)")]
    Users,
}

/// Creates a Bot instance with a custom HTTP client
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Failed to create bot (missing token, client build failure)
pub fn create_bot() -> anyhow::Result<Bot> {
    let token = config::BOT_TOKEN.clone();
    if token.is_empty() {
        return Err(anyhow::anyhow!("BOT_TOKEN / TELOXIDE_TOKEN is not set"));
    }

    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    Ok(Bot::with_client(token, client))
}

/// Sets up bot commands in Telegram UI
///
/// # Arguments
/// * `bot` - Bot instance to configure
///
/// # Returns
/// * `Ok(())` - Commands set successfully
/// * `Err(RequestError)` - Failed to set commands
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "приветствие и главное меню"),
        BotCommand::new("help", "краткая справка"),
        BotCommand::new("account", "информация о твоем аккаунте"),
        BotCommand::new("premium", "подписка и тарифы"),
        BotCommand::new("stats", "глобальная статистика (только для администратора)"),
        BotCommand::new("users", "список всех пользователей (только для администратора)"),
    ])
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_descriptions() {
        let commands = Command::descriptions();
        let command_list = format!("{}", commands);

        assert!(command_list.contains("Я умею"));
        assert!(command_list.contains("start"));
        assert!(command_list.contains("account"));
        assert!(command_list.contains("premium"));
    }
}
