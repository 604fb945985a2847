//! Rover Reminder configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ReminderError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReminderConfig {
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ReminderConfig {
    /// Load config from the default path (~/.rover-reminder/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReminderError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ReminderError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ReminderError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Rover Reminder home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rover-reminder")
    }
}

/// Expand `~` in a configured path.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// Reminder sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Global switch. Sweeps are no-ops while off.
    #[serde(default)]
    pub enabled: bool,
    /// Threshold used when an account has no override.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Only users active within this many days are checked. 0 disables the gate.
    #[serde(default = "default_active_user_days")]
    pub active_user_days: u32,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_threshold() -> u32 { 230 }
fn default_active_user_days() -> u32 { 42 }
fn default_check_interval() -> u64 { 360 }

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_threshold(),
            active_user_days: default_active_user_days(),
            check_interval_secs: default_check_interval(),
        }
    }
}

/// Delivery queue pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pause after each delivery before the next job is taken.
    #[serde(default = "default_send_interval")]
    pub send_interval_ms: u64,
    /// Upper bound on one delivery. 0 disables the queue-level deadline.
    #[serde(default = "default_job_deadline")]
    pub job_deadline_secs: u64,
}

fn default_send_interval() -> u64 { 1000 }
fn default_job_deadline() -> u64 { 30 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: default_send_interval(),
            job_deadline_secs: default_job_deadline(),
        }
    }
}

/// Outbound mail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Active provider profile: "smtp" or "qq".
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Optional HTML template overriding the built-in one.
    #[serde(default = "default_template_path")]
    pub template_path: String,
    /// SMTP transport timeout.
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub smtp: MailProfile,
    #[serde(default)]
    pub qq: MailProfile,
}

fn default_provider() -> String { "smtp".into() }
fn default_subject() -> String { "鸣潮体力推送".into() }
fn default_template_path() -> String { "~/.rover-reminder/mail/template.html".into() }
fn default_mail_timeout() -> u64 { 10 }

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            subject: default_subject(),
            template_path: default_template_path(),
            timeout_secs: default_mail_timeout(),
            smtp: MailProfile::default(),
            qq: MailProfile::default(),
        }
    }
}

/// One mail provider profile. Unset fields fall back to the provider preset.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MailProfile {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Provider authorization code, used when `password` is empty.
    #[serde(default)]
    pub auth_code: Option<String>,
    /// Sender address. A value without `@` is treated as a display name.
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Implicit TLS (SMTPS).
    #[serde(default)]
    pub use_ssl: Option<bool>,
    /// STARTTLS upgrade when `use_ssl` is off.
    #[serde(default)]
    pub starttls: Option<bool>,
}

/// Remote game API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_server_id")]
    pub server_id: String,
    #[serde(default = "default_server_id_overseas")]
    pub server_id_overseas: String,
    #[serde(default = "default_game_id")]
    pub game_id: u32,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Provider codes meaning the token is no longer accepted.
    #[serde(default = "default_invalid_codes")]
    pub invalid_credential_codes: Vec<i64>,
}

fn default_endpoint() -> String { "https://api.kurobbs.com/gamer/widget/game3/getData".into() }
fn default_server_id() -> String { "76402e5b20be2c39f095a152090afddc".into() }
fn default_server_id_overseas() -> String { "919752ae5ea09c1ced910dd668a63ffb".into() }
fn default_game_id() -> u32 { 3 }
fn default_api_timeout() -> u64 { 10 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay() -> u64 { 1000 }
fn default_invalid_codes() -> Vec<i64> { vec![220] }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            server_id: default_server_id(),
            server_id_overseas: default_server_id_overseas(),
            game_id: default_game_id(),
            timeout_secs: default_api_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            invalid_credential_codes: default_invalid_codes(),
        }
    }
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Daily send counters (JSON).
    #[serde(default = "default_status_path")]
    pub status_path: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_db_path() -> String { "~/.rover-reminder/reminder.db".into() }
fn default_status_path() -> String { "~/.rover-reminder/status.json".into() }
fn default_log_dir() -> String { "~/.rover-reminder/log".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            status_path: default_status_path(),
            log_dir: default_log_dir(),
        }
    }
}
