use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "golosok")]
#[command(author, version, about = "Telegram bot that clones a user's voice and speaks any text with it", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot in normal mode
    Run,

    /// Expire overdue premium subscriptions and exit
    Expire,

    /// Print global bot statistics and exit
    Stats,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
