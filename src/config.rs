use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    /// PostgreSQL connection URL. When absent the in-memory store is used.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Ledger engine tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Bounded wait for per-account locks before a request fails with `Busy`
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    /// Default page size for activity history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_lock_wait_ms() -> u64 {
    2000
}

fn default_history_limit() -> usize {
    50
}

fn default_max_connections() -> u32 {
    20
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_wait_ms: default_lock_wait_ms(),
            history_limit: default_history_limit(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl LedgerConfig {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: "debug"
log_dir: "./logs"
log_file: "ledger.log"
use_json: false
rotation: "never"
enable_tracing: true
"#;

    #[test]
    fn test_ledger_defaults_when_section_missing() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert!(config.postgres_url.is_none());
        assert_eq!(config.ledger.lock_wait_ms, 2000);
        assert_eq!(config.ledger.history_limit, 50);
        assert_eq!(config.ledger.lock_wait(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_ledger_section() {
        let yaml = format!(
            "{}postgres_url: \"postgresql://localhost/ledger\"\nledger:\n  lock_wait_ms: 250\n",
            MINIMAL
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(
            config.postgres_url.as_deref(),
            Some("postgresql://localhost/ledger")
        );
        assert_eq!(config.ledger.lock_wait_ms, 250);
        assert_eq!(config.ledger.max_connections, 20);
    }

    #[test]
    fn test_missing_required_field_fails() {
        assert!(AppConfig::from_yaml("log_level: info\n").is_err());
    }
}
