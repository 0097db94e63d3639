//! LeaseWarden configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{LeaseError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub side_channel: SideChannelConfig,
    #[serde(default)]
    pub version: VersionConfig,
}

impl LeaseConfig {
    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LeaseError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse TOML and apply environment overrides.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LeaseError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config.with_env_overrides())
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| LeaseError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the LeaseWarden home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".leasewarden")
    }

    fn validate(&self) -> Result<()> {
        if self.jobs.batch_size == 0 {
            return Err(LeaseError::Config("jobs.batch_size must be > 0".into()));
        }
        if self.jobs.retention_days < 0 {
            return Err(LeaseError::Config("jobs.retention_days must be >= 0".into()));
        }
        if self.dispatcher.max_retries == 0 {
            return Err(LeaseError::Config("dispatcher.max_retries must be > 0".into()));
        }
        Ok(())
    }

    /// Secrets from the environment win over the file.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("LEASEWARDEN_CONTROL_PLANE_KEY") {
            self.control_plane.api_key = key;
        }
        if let Ok(pw) = std::env::var("LEASEWARDEN_SMTP_PASSWORD") {
            self.smtp.password = pw;
        }
        if let Ok(token) = std::env::var("LEASEWARDEN_TELEGRAM_TOKEN") {
            self.side_channel.bot_token = token;
        }
        self
    }
}

/// Datastore location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.leasewarden/leasewarden.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl DatabaseConfig {
    /// Path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// Scan and schedule settings shared by all jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Days an expired resource is kept before deletion.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// How often the daemon evaluates schedules.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Cron expression per job name. Missing jobs fall back to the defaults.
    #[serde(default = "default_schedules")]
    pub schedules: BTreeMap<String, String>,
}

fn default_batch_size() -> usize { 20 }
fn default_retention_days() -> i64 { 7 }
fn default_tick_secs() -> u64 { 30 }

fn default_schedules() -> BTreeMap<String, String> {
    [
        ("expire", "*/15 * * * *"),
        ("delete", "0 * * * *"),
        ("expiry-reminders", "0 */6 * * *"),
        ("deletion-reminders", "30 */6 * * *"),
        ("dispatch-notifications", "*/5 * * * *"),
        ("version-check", "0 9 * * *"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            retention_days: default_retention_days(),
            tick_secs: default_tick_secs(),
            schedules: default_schedules(),
        }
    }
}

impl JobsConfig {
    /// Cron expression for a job, falling back to the built-in default.
    pub fn schedule_for(&self, job: &str) -> Option<String> {
        self.schedules
            .get(job)
            .cloned()
            .or_else(|| default_schedules().get(job).cloned())
    }
}

/// Notification dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Total send attempts per notification.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause after every send attempt.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

fn default_max_retries() -> u32 { 4 }
fn default_throttle_ms() -> u64 { 1000 }

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            throttle_ms: default_throttle_ms(),
        }
    }
}

/// Provisioning API connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Count a delete of an already-removed server as success.
    #[serde(default)]
    pub treat_missing_as_deleted: bool,
}

fn default_timeout_secs() -> u64 { 30 }

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            treat_missing_as_deleted: false,
        }
    }
}

/// Outbound mail server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_from")]
    pub from: String,
}

fn default_smtp_host() -> String { "localhost".into() }
fn default_smtp_port() -> u16 { 587 }
fn default_from() -> String { "LeaseWarden <noreply@localhost>".into() }

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_from(),
        }
    }
}

/// Operational alert channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideChannelConfig {
    /// "telegram", "discord" or "none".
    #[serde(default = "default_side_provider")]
    pub provider: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub webhook_url: String,
}

fn default_side_provider() -> String { "none".into() }

impl Default for SideChannelConfig {
    fn default() -> Self {
        Self {
            provider: default_side_provider(),
            bot_token: String::new(),
            chat_id: String::new(),
            webhook_url: String::new(),
        }
    }
}

/// Where the latest published version is read from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionConfig {
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub branch: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let cfg = LeaseConfig::parse("").unwrap();
        assert_eq!(cfg.jobs.batch_size, 20);
        assert_eq!(cfg.dispatcher.max_retries, 4);
        assert_eq!(cfg.control_plane.timeout_secs, 30);
        assert!(!cfg.control_plane.treat_missing_as_deleted);
        assert_eq!(cfg.side_channel.provider, "none");
    }

    #[test]
    fn test_partial_section() {
        let cfg = LeaseConfig::parse(
            r#"
[jobs]
retention_days = 14

[jobs.schedules]
expire = "*/5 * * * *"

[dispatcher]
throttle_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(cfg.jobs.retention_days, 14);
        assert_eq!(cfg.jobs.batch_size, 20);
        assert_eq!(cfg.dispatcher.throttle_ms, 0);
        assert_eq!(cfg.jobs.schedule_for("expire").as_deref(), Some("*/5 * * * *"));
        // Unlisted jobs keep their built-in schedule
        assert_eq!(cfg.jobs.schedule_for("delete").as_deref(), Some("0 * * * *"));
        assert!(cfg.jobs.schedule_for("nope").is_none());
    }

    #[test]
    fn test_env_secrets_override_file() {
        // Only this test touches these variables
        unsafe {
            std::env::set_var("LEASEWARDEN_SMTP_PASSWORD", "from-env");
            std::env::set_var("LEASEWARDEN_TELEGRAM_TOKEN", "123:env");
        }
        let cfg = LeaseConfig::parse(
            r#"
[smtp]
password = "from-file"

[side_channel]
provider = "telegram"
bot_token = "123:file"
"#,
        );
        unsafe {
            std::env::remove_var("LEASEWARDEN_SMTP_PASSWORD");
            std::env::remove_var("LEASEWARDEN_TELEGRAM_TOKEN");
        }
        let cfg = cfg.unwrap();
        assert_eq!(cfg.smtp.password, "from-env");
        assert_eq!(cfg.side_channel.bot_token, "123:env");
        // Values without an override come from the file
        assert_eq!(cfg.side_channel.provider, "telegram");
    }

    #[test]
    fn test_rejects_zero_batch() {
        let err = LeaseConfig::parse("[jobs]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(err, LeaseError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join("leasewarden-test-config");
        let path = dir.join("config.toml");
        let mut cfg = LeaseConfig::default();
        cfg.version.branch = Some("main".into());
        cfg.save_to(&path).unwrap();
        let loaded = LeaseConfig::load_from(&path).unwrap();
        assert_eq!(loaded.version.branch.as_deref(), Some("main"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
