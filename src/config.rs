//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the path in `MONETA_CONFIG`), then applies the `MONETA_LOG_LEVEL`
//! env override. Secrets (`TELEGRAM_BOT_TOKEN`, `SHEETS_API_TOKEN`) are
//! only ever read from the environment, never from TOML.

use std::{
    collections::HashMap,
    env, fs,
    path::Path,
};

use serde::Deserialize;

use crate::error::AppError;

/// Telegram channel configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Whether the Telegram channel is explicitly enabled.
    pub enabled: bool,
}

/// Ledger backend configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Which backend is active (`"memory"` or `"sheets"`).
    pub backend: String,
    /// Spreadsheet document id for the `sheets` backend.
    pub spreadsheet_id: String,
    /// Grid size for newly created month partitions.
    pub partition_rows: u32,
    pub partition_cols: u32,
    /// Per-request HTTP timeout in seconds for the `sheets` backend.
    pub timeout_seconds: u64,
}

/// Entry-collection prompts configuration.
#[derive(Debug, Clone)]
pub struct EntryConfig {
    /// Category choices offered after a valid amount.
    pub categories: Vec<String>,
    /// Description choices offered after the category.
    pub descriptions: Vec<String>,
}

/// Fully-resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    pub telegram: TelegramConfig,
    pub ledger: LedgerConfig,
    pub entry: EntryConfig,
    /// Known users: Telegram chat id -> display name recorded in the ledger.
    pub users: HashMap<i64, String>,
    /// Bearer token from `SHEETS_API_TOKEN` env — `None` for the memory backend.
    /// Never sourced from TOML.
    pub sheets_api_token: Option<String>,
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    bot: RawBot,
    #[serde(default)]
    telegram: RawTelegram,
    #[serde(default)]
    ledger: RawLedger,
    #[serde(default)]
    entry: RawEntry,
    /// TOML table keys are strings; resolved to `i64` chat ids in `load_from`.
    #[serde(default)]
    users: HashMap<String, String>,
}

#[derive(Deserialize)]
struct RawBot {
    name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawTelegram {
    /// Defaults to `true`: the bot is useless without its only channel.
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawTelegram {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize)]
struct RawLedger {
    #[serde(default = "default_backend")]
    backend: String,
    #[serde(default)]
    spreadsheet_id: String,
    #[serde(default = "default_partition_rows")]
    partition_rows: u32,
    #[serde(default = "default_partition_cols")]
    partition_cols: u32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawLedger {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            spreadsheet_id: String::new(),
            partition_rows: default_partition_rows(),
            partition_cols: default_partition_cols(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default = "default_categories")]
    categories: Vec<String>,
    #[serde(default = "default_descriptions")]
    descriptions: Vec<String>,
}

impl Default for RawEntry {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            descriptions: default_descriptions(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_partition_rows() -> u32 {
    1000
}

fn default_partition_cols() -> u32 {
    20
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_categories() -> Vec<String> {
    ["Groceries", "Eating out", "Household", "Clothes", "Health", "Fun", "Other"]
        .map(String::from)
        .to_vec()
}

fn default_descriptions() -> Vec<String> {
    ["Lunch", "Vegetables", "Supermarket"].map(String::from).to_vec()
}

fn default_true() -> bool {
    true
}

/// Load config from `MONETA_CONFIG` or `config/default.toml`, then apply
/// env-var overrides.
pub fn load() -> Result<Config, AppError> {
    let path = env::var("MONETA_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let log_level_override = env::var("MONETA_LOG_LEVEL").ok();
    load_from(Path::new(&path), log_level_override.as_deref())
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, log_level_override: Option<&str>) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let log_level = log_level_override
        .unwrap_or(&parsed.bot.log_level)
        .to_string();

    let mut users = HashMap::new();
    for (id, name) in parsed.users {
        let id: i64 = id
            .parse()
            .map_err(|_| AppError::Config(format!("non-numeric user id in [users]: '{id}'")))?;
        users.insert(id, name);
    }

    Ok(Config {
        bot_name: parsed.bot.name,
        log_level,
        telegram: TelegramConfig {
            enabled: parsed.telegram.enabled,
        },
        ledger: LedgerConfig {
            backend: parsed.ledger.backend,
            spreadsheet_id: parsed.ledger.spreadsheet_id,
            partition_rows: parsed.ledger.partition_rows,
            partition_cols: parsed.ledger.partition_cols,
            timeout_seconds: parsed.ledger.timeout_seconds,
        },
        entry: EntryConfig {
            categories: parsed.entry.categories,
            descriptions: parsed.entry.descriptions,
        },
        users,
        sheets_api_token: env::var("SHEETS_API_TOKEN").ok(),
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests — memory backend, no tokens, no external calls.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            bot_name: "test".into(),
            log_level: "info".into(),
            telegram: TelegramConfig { enabled: false },
            ledger: LedgerConfig {
                backend: "memory".into(),
                spreadsheet_id: String::new(),
                partition_rows: 1000,
                partition_cols: 20,
                timeout_seconds: 1,
            },
            entry: EntryConfig {
                categories: vec!["Groceries".into(), "Fun".into()],
                descriptions: vec!["Supermarket".into()],
            },
            users: HashMap::from([(1, "Alice".to_string()), (2, "Bob".to_string())]),
            sheets_api_token: None,
        }
    }
}
