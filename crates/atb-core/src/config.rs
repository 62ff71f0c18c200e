use std::{env, path::PathBuf, time::Duration};

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    Result,
};

pub const BOT_NAME: &str = "Advanced Telegram Bot";
pub const BOT_VERSION: &str = "2.0.0";

/// Warnings that trigger an automatic ban.
pub const WARN_LIMIT: u32 = 3;

/// Typed configuration, read from the process environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_api_url: Option<String>,

    // Access
    pub owner_id: UserId,
    pub sudo_users: Vec<UserId>,
    pub command_prefix: String,

    // Database
    pub enable_database: bool,
    pub database_url: Option<String>,

    // Logging
    pub log_level: String,
    pub log_dir: PathBuf,
    pub log_channel: Option<ChatId>,

    // External services
    pub weather_api_key: Option<String>,
    pub deepl_api_key: Option<String>,
    pub download_api_url: Option<String>,
    pub download_dir: PathBuf,

    // Performance
    pub max_workers: usize,
    pub flood_wait_threshold: Duration,

    // Moderation state bounds
    pub warning_ttl: Duration,
    pub warning_capacity: usize,

    pub restart_file: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Existing env always wins over `.env`.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (env in production, maps in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let bot_token = get("BOT_TOKEN").unwrap_or_default();
        let owner_id = get("OWNER_ID")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(0);

        let mut missing = Vec::new();
        if bot_token.trim().is_empty() {
            missing.push("BOT_TOKEN");
        }
        if owner_id == 0 {
            missing.push("OWNER_ID");
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let bot_api_url = get("BOT_API_URL");

        let sudo_users = parse_csv_i64(get("SUDO_USERS"))
            .into_iter()
            .map(UserId)
            .collect();
        let command_prefix = get("COMMAND_PREFIX").unwrap_or_else(|| ".".to_string());

        let enable_database = parse_bool(get("ENABLE_DATABASE")).unwrap_or(false);
        let database_url = get("DATABASE_URL");

        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_dir = PathBuf::from(get("LOG_DIR").unwrap_or_else(|| "logs".to_string()));
        let log_channel = get("LOG_CHANNEL")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|id| *id != 0)
            .map(ChatId);

        let weather_api_key = get("WEATHER_API_KEY");
        let deepl_api_key = get("DEEPL_API_KEY");
        let download_api_url = get("DOWNLOAD_API_URL").map(|s| s.trim_end_matches('/').to_string());
        let download_dir =
            PathBuf::from(get("DOWNLOAD_DIR").unwrap_or_else(|| "downloads".to_string()));

        let max_workers = parse_usize(get("MAX_WORKERS")).unwrap_or(4).max(1);
        let flood_wait_threshold =
            Duration::from_secs(parse_u64(get("FLOOD_WAIT_THRESHOLD")).unwrap_or(10));

        let warning_ttl =
            Duration::from_secs(parse_u64(get("WARNING_TTL_HOURS")).unwrap_or(168) * 3600);
        let warning_capacity = parse_usize(get("WARNING_CAPACITY")).unwrap_or(10_000).max(1);

        let restart_file = PathBuf::from(
            get("RESTART_FILE").unwrap_or_else(|| "/tmp/atb-restart.json".to_string()),
        );

        Ok(Self {
            bot_token,
            bot_api_url,
            owner_id: UserId(owner_id),
            sudo_users,
            command_prefix,
            enable_database,
            database_url,
            log_level,
            log_dir,
            log_channel,
            weather_api_key,
            deepl_api_key,
            download_api_url,
            download_dir,
            max_workers,
            flood_wait_threshold,
            warning_ttl,
            warning_capacity,
            restart_file,
        })
    }

    /// Database URL when persistence is both enabled and configured.
    pub fn database(&self) -> Option<&str> {
        if !self.enable_database {
            return None;
        }
        self.database_url.as_deref()
    }
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_usize(v: Option<String>) -> Option<usize> {
    v.and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn missing_required_fields_are_listed() {
        let err = load(&[]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("BOT_TOKEN"));
        assert!(msg.contains("OWNER_ID"));

        let err = load(&[("BOT_TOKEN", "t"), ("OWNER_ID", "0")]).unwrap_err();
        assert!(err.to_string().contains("OWNER_ID"));
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("BOT_TOKEN", "t"), ("OWNER_ID", "42")]).unwrap();
        assert_eq!(cfg.owner_id, UserId(42));
        assert_eq!(cfg.command_prefix, ".");
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.flood_wait_threshold, Duration::from_secs(10));
        assert!(cfg.database().is_none());
        assert!(cfg.log_channel.is_none());
    }

    #[test]
    fn sudo_users_parse_from_csv() {
        let cfg = load(&[
            ("BOT_TOKEN", "t"),
            ("OWNER_ID", "1"),
            ("SUDO_USERS", " 2, x,3 ,"),
        ])
        .unwrap();
        assert_eq!(cfg.sudo_users, vec![UserId(2), UserId(3)]);
        assert_eq!(cfg.owner_id, UserId(1));
    }

    #[test]
    fn database_requires_flag_and_url() {
        let cfg = load(&[
            ("BOT_TOKEN", "t"),
            ("OWNER_ID", "1"),
            ("DATABASE_URL", "bot.db"),
        ])
        .unwrap();
        assert!(cfg.database().is_none());

        let cfg = load(&[
            ("BOT_TOKEN", "t"),
            ("OWNER_ID", "1"),
            ("DATABASE_URL", "bot.db"),
            ("ENABLE_DATABASE", "true"),
        ])
        .unwrap();
        assert_eq!(cfg.database(), Some("bot.db"));
    }
}
