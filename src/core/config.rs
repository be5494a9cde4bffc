use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the bot
/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: golosok.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "golosok.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: golosok.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "golosok.log".to_string()));

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Free-tier limits
pub mod limits {
    use once_cell::sync::Lazy;

    /// Maximum number of free synthesis requests per user
    /// Read from MAX_FREE_TRIALS environment variable (0 disables the counter)
    /// Default: 2
    pub static MAX_FREE_TRIALS: Lazy<i64> = Lazy::new(|| super::env_i64("MAX_FREE_TRIALS", 2));

    /// Maximum text length in characters for a single free-tier request
    /// Read from MAX_CHARS_PER_REQUEST environment variable
    /// Default: 100
    pub static MAX_CHARS_PER_REQUEST: Lazy<i64> = Lazy::new(|| super::env_i64("MAX_CHARS_PER_REQUEST", 100));

    /// Cumulative free-tier character budget per user
    /// Read from FREE_CHAR_LIMIT_TOTAL environment variable
    /// Default: 500
    pub static FREE_CHAR_LIMIT_TOTAL: Lazy<i64> = Lazy::new(|| super::env_i64("FREE_CHAR_LIMIT_TOTAL", 500));

    /// Minimum accepted voice sample duration in seconds
    pub static MIN_SAMPLE_SECS: Lazy<i64> = Lazy::new(|| super::env_i64("MIN_SAMPLE_SECS", 10));

    /// Maximum accepted voice sample duration in seconds
    pub static MAX_SAMPLE_SECS: Lazy<i64> = Lazy::new(|| super::env_i64("MAX_SAMPLE_SECS", 30));
}

/// Premium plan configuration
pub mod premium {
    use once_cell::sync::Lazy;

    /// Monthly character budget for the metered premium plan
    /// Read from MONTHLY_PREMIUM_CHARS environment variable
    /// Default: 50000
    pub static MONTHLY_CHARS: Lazy<i64> = Lazy::new(|| super::env_i64("MONTHLY_PREMIUM_CHARS", 50_000));

    /// Character snapshot stored when a trial plan is activated.
    /// Trial plans are time-bounded and unmetered, the value is informational.
    /// Read from TRIAL_CHARS environment variable
    /// Default: 1000
    pub static TRIAL_CHARS: Lazy<i64> = Lazy::new(|| super::env_i64("TRIAL_CHARS", 1_000));

    /// Trial plan length in days
    /// Read from TRIAL_DAYS environment variable
    /// Default: 3
    pub static TRIAL_DAYS: Lazy<i64> = Lazy::new(|| super::env_i64("TRIAL_DAYS", 3));

    /// Default premium grant length in days
    /// Read from PREMIUM_DAYS environment variable
    /// Default: 30
    pub static PREMIUM_DAYS: Lazy<i64> = Lazy::new(|| super::env_i64("PREMIUM_DAYS", 30));

    /// Voice-clone allowance for premium users (free tier gets exactly one)
    /// Read from MAX_VOICE_CLONES_PREMIUM environment variable
    /// Default: 3
    pub static MAX_VOICE_CLONES: Lazy<i64> = Lazy::new(|| super::env_i64("MAX_VOICE_CLONES_PREMIUM", 3));

    /// Channel advertised on /premium for payment instructions
    /// Read from PAYMENT_CHANNEL environment variable
    pub static PAYMENT_CHANNEL: Lazy<String> =
        Lazy::new(|| std::env::var("PAYMENT_CHANNEL").unwrap_or_else(|_| "golosok_pay".to_string()));
}

/// Mandatory channel subscription configuration
pub mod channels {
    use once_cell::sync::Lazy;
    use std::env;

    fn parse_channels(raw: &str) -> Vec<String> {
        raw.split([',', ' ', '\n', '\t'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| part.trim_start_matches('@').to_string())
            .collect()
    }

    /// Channels the user must be subscribed to before using the bot
    /// (comma-separated, with or without @). Empty list disables the gate.
    /// Read from REQUIRED_CHANNELS environment variable
    pub static REQUIRED_CHANNELS: Lazy<Vec<String>> = Lazy::new(|| {
        env::var("REQUIRED_CHANNELS")
            .ok()
            .map(|raw| parse_channels(&raw))
            .unwrap_or_default()
    });

    #[cfg(test)]
    mod tests {
        use super::parse_channels;

        #[test]
        fn test_parse_channels_strips_at_and_whitespace() {
            let parsed = parse_channels("@first, second  third\n@fourth");
            assert_eq!(parsed, vec!["first", "second", "third", "fourth"]);
        }

        #[test]
        fn test_parse_channels_empty() {
            assert!(parse_channels("").is_empty());
            assert!(parse_channels(" , ,, ").is_empty());
        }
    }
}

/// Admin configuration
pub mod admin {
    use once_cell::sync::Lazy;
    use std::env;

    fn parse_admin_ids(raw: &str) -> Vec<i64> {
        raw.split([',', ' ', '\n', '\t'])
            .filter_map(|part| part.trim().parse::<i64>().ok())
            .collect()
    }

    /// Admin user IDs (comma-separated)
    /// Read from ADMIN_IDS environment variable
    pub static ADMIN_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
        env::var("ADMIN_IDS")
            .ok()
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default()
    });

    /// Admin user ID for direct notifications (new users, failures)
    /// Read from ADMIN_USER_ID or fallback to first ADMIN_IDS entry
    /// Defaults to 0 if not set (no admin notifications)
    pub static ADMIN_USER_ID: Lazy<i64> = Lazy::new(|| {
        env::var("ADMIN_USER_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .or_else(|| ADMIN_IDS.first().copied())
            .unwrap_or(0)
    });

    #[cfg(test)]
    mod tests {
        use super::parse_admin_ids;

        #[test]
        fn test_parse_admin_ids_mixed_separators() {
            assert_eq!(parse_admin_ids("1, 2 3\n4"), vec![1, 2, 3, 4]);
        }

        #[test]
        fn test_parse_admin_ids_skips_garbage() {
            assert_eq!(parse_admin_ids("12,abc, 34"), vec![12, 34]);
        }
    }
}

/// Speech provider (Speechify) configuration
pub mod speech {
    use once_cell::sync::Lazy;
    use std::env;

    /// API key for the speech provider
    /// Read from SPEECHIFY_API_KEY environment variable
    pub static API_KEY: Lazy<String> =
        Lazy::new(|| env::var("SPEECHIFY_API_KEY").unwrap_or_else(|_| String::new()));

    /// Base URL of the speech provider API
    /// Read from SPEECHIFY_API_URL environment variable
    pub static API_URL: Lazy<String> =
        Lazy::new(|| env::var("SPEECHIFY_API_URL").unwrap_or_else(|_| "https://api.sws.speechify.com".to_string()));

    /// Timeout for provider requests (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;

    pub fn timeout() -> std::time::Duration {
        std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Telegram HTTP requests (in seconds)
    /// Large enough for voice uploads over slow links
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Premium expiry sweeper configuration
pub mod sweeper {
    use super::Duration;

    /// Interval between background expiry passes (in seconds).
    /// Expiry is also applied lazily on every record read, the sweeper only
    /// keeps the table tidy for /users and /stats.
    pub const INTERVAL_SECS: u64 = 3600;

    pub fn interval() -> Duration {
        Duration::from_secs(INTERVAL_SECS)
    }
}
