use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::record::Jurisdiction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub jurisdiction: Jurisdiction,
    /// SQLite database file. Defaults to `~/.ledgerscan/data/ledgerscan.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Database location with `~` expanded, falling back to the default.
    pub fn database_path(&self) -> PathBuf {
        match self.database_path.as_deref() {
            Some(path) if !path.trim().is_empty() => expand_home(path),
            _ => crate::store::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Chat-completions API; also covers local compatible servers.
    Openai,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    /// Overrides the vendor endpoint, e.g. `http://localhost:11434/v1`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Run `validate_extraction` before accepting a record.
    #[serde(default = "default_true")]
    pub validate: bool,
    #[serde(default = "default_duplicate_window_days")]
    pub duplicate_window_days: u32,
    /// Skip documents that look like duplicates instead of only warning.
    #[serde(default)]
    pub skip_duplicates: bool,
}

fn default_true() -> bool {
    true
}

fn default_duplicate_window_days() -> u32 {
    3
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            validate: true,
            duplicate_window_days: default_duplicate_window_days(),
            skip_duplicates: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

pub(crate) fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return match path.strip_prefix("~/") {
                Some(rest) => home.join(rest),
                None => home,
            };
        }
    }
    PathBuf::from(path)
}
