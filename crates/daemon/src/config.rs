// Daemon configuration file.
//
// YAML (`.yaml`/`.yml`) or TOML (`.toml`), chosen by extension. Every
// field has a default so partial files load; `validate` checks what the
// selected provider actually needs.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use cron::Schedule;
use notetally_common::types::ProviderKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::EngineConfig;
use crate::lock::LockConfig;
use crate::store::S3Settings;

/// Every minute, on second zero.
pub const DEFAULT_SCHEDULE: &str = "0 * * * * *";

// ── App config ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    pub is_debug: bool,
    /// Lock holder id of this instance. Generated when empty.
    pub app_id: String,
    /// `app_id` was generated at load time rather than configured.
    #[serde(skip)]
    pub app_id_generated: bool,
    /// Id of the note that receives the merged todo list.
    pub note_id: String,
    /// Folder whose direct children are scanned.
    pub parent_id: String,
    /// Cron expression with a seconds field.
    pub schedule: String,
    pub s3: S3Config,
    pub web_clipper: WebClipperConfig,
    pub lock: LockSettings,
    pub timeouts: TimeoutSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            is_debug: false,
            app_id: String::new(),
            app_id_generated: false,
            note_id: String::new(),
            parent_id: String::new(),
            schedule: DEFAULT_SCHEDULE.into(),
            s3: S3Config::default(),
            web_clipper: WebClipperConfig::default(),
            lock: LockSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from a YAML or TOML file and fill in a generated `app_id`
    /// when none is configured.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let mut config = format.parse(&contents)?;
        if config.app_id.trim().is_empty() {
            config.app_id = generate_app_id();
            config.app_id_generated = true;
        }
        Ok(config)
    }

    /// Check the settings required to run against `provider`.
    pub fn validate(&self, provider: ProviderKind) -> Result<(), ConfigError> {
        require(&self.note_id, "note_id")?;
        require(&self.parent_id, "parent_id")?;
        self.cron_schedule()?;

        self.validate_backend(provider)?;

        if self.lock.poll_interval_ms == 0 || self.lock.release_poll_ms == 0 {
            return Err(ConfigError::Invalid("lock poll intervals must be non-zero".into()));
        }
        if self.timeouts.call_secs == 0 || self.timeouts.cycle_secs == 0 {
            return Err(ConfigError::Invalid("call and cycle timeouts must be non-zero".into()));
        }
        Ok(())
    }

    /// Check only the section `provider` needs to connect. Enough for
    /// lock inspection, which never touches notes.
    pub fn validate_backend(&self, provider: ProviderKind) -> Result<(), ConfigError> {
        match provider {
            ProviderKind::ObjectStore => {
                require(&self.s3.bucket, "s3.bucket")?;
                require(&self.s3.region, "s3.region")
            }
            ProviderKind::WebClipper => {
                require(&self.web_clipper.host, "web_clipper.host")?;
                require(&self.web_clipper.token, "web_clipper.token")
            }
        }
    }

    pub fn cron_schedule(&self) -> Result<Schedule, ConfigError> {
        Schedule::from_str(&self.schedule).map_err(|e| ConfigError::Schedule {
            expression: self.schedule.clone(),
            message: e.to_string(),
        })
    }

    pub fn lock_config(&self) -> LockConfig {
        self.lock.lock_config(self.timeouts.call())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            holder: self.app_id.clone(),
            note_id: self.note_id.clone(),
            parent_id: self.parent_id.clone(),
            release_wait: self.lock.release_wait(),
            lock_timeout: self.lock.acquire_timeout(),
            call_timeout: self.timeouts.call(),
            cycle_timeout: self.timeouts.cycle(),
            release_timeout: self.timeouts.release(),
        }
    }
}

fn require(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("`{field}` is required")));
    }
    Ok(())
}

/// Random holder id: a UUID v4 without dashes.
pub fn generate_app_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// ── Sections ───────────────────────────────────────────────────────

/// S3-compatible sync target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct S3Config {
    /// Endpoint URL (e.g. `https://s3.example.com`); empty for AWS.
    pub host: String,
    pub key: String,
    pub secret: String,
    pub bucket: String,
    pub region: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            host: String::new(),
            key: String::new(),
            secret: String::new(),
            bucket: String::new(),
            region: "us-east-1".into(),
        }
    }
}

impl S3Config {
    pub fn settings(&self) -> S3Settings {
        S3Settings {
            endpoint: self.host.clone(),
            region: self.region.clone(),
            access_key: self.key.clone(),
            secret_key: self.secret.clone(),
            bucket: self.bucket.clone(),
        }
    }
}

/// Notes web clipper service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WebClipperConfig {
    /// Base URL (e.g. `http://localhost:41184`).
    pub host: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockSettings {
    /// How long to wait for foreign markers to clear before acquiring.
    pub release_wait_secs: u64,
    pub acquire_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub backoff_interval_ms: u64,
    pub backoff_jitter_ms: u64,
    pub release_poll_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            release_wait_secs: 30,
            acquire_timeout_secs: 30,
            poll_interval_ms: 250,
            backoff_interval_ms: 1000,
            backoff_jitter_ms: 500,
            release_poll_ms: 1000,
        }
    }
}

impl LockSettings {
    /// Lock polling settings; `call_timeout` bounds each marker call.
    pub fn lock_config(&self, call_timeout: Duration) -> LockConfig {
        LockConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            backoff_interval: Duration::from_millis(self.backoff_interval_ms),
            backoff_jitter: Duration::from_millis(self.backoff_jitter_ms),
            release_poll: Duration::from_millis(self.release_poll_ms),
            call_timeout,
        }
    }

    pub fn release_wait(&self) -> Duration {
        Duration::from_secs(self.release_wait_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Upper bound of a single storage call.
    pub call_secs: u64,
    /// Upper bound of a whole cycle, excluding the lock release.
    pub cycle_secs: u64,
    pub release_secs: u64,
    /// Grace period for the in-flight cycle on shutdown.
    pub shutdown_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { call_secs: 60, cycle_secs: 300, release_secs: 15, shutdown_secs: 15 }
    }
}

impl TimeoutSettings {
    pub fn call(&self) -> Duration {
        Duration::from_secs(self.call_secs)
    }

    pub fn cycle(&self) -> Duration {
        Duration::from_secs(self.cycle_secs)
    }

    pub fn release(&self) -> Duration {
        Duration::from_secs(self.release_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

// ── File format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    fn parse(self, contents: &str) -> Result<AppConfig, ConfigError> {
        match self {
            // An empty YAML document is `null`, not an empty mapping.
            Self::Yaml if contents.trim().is_empty() => Ok(AppConfig::default()),
            Self::Yaml => serde_yaml::from_str(contents).map_err(ConfigError::Yaml),
            Self::Toml => toml::from_str(contents).map_err(ConfigError::Toml),
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Toml(toml::de::Error),
    UnsupportedFormat(PathBuf),
    Invalid(String),
    Schedule { expression: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Yaml(e) => write!(f, "config parse error: {e}"),
            Self::Toml(e) => write!(f, "config parse error: {e}"),
            Self::UnsupportedFormat(path) => write!(
                f,
                "unsupported config format `{}` (expected .yaml, .yml or .toml)",
                path.display()
            ),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
            Self::Schedule { expression, message } => {
                write!(f, "invalid schedule `{expression}`: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Yaml(e) => Some(e),
            Self::Toml(e) => Some(e),
            _ => None,
        }
    }
}
