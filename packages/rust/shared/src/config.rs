//! Application configuration for Thyself.
//!
//! User config lives at `~/.thyself/thyself.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ThyselfError};
use crate::types::DEFAULT_PLATFORM;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "thyself.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".thyself";

// ---------------------------------------------------------------------------
// Config structs (matching thyself.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local storage location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Feed observer timings.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Retention windows and caps.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Bridge relay settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Remote analysis backend.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path (`~` is expanded).
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.thyself/thyself.db".into()
}

/// `[observer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Interval of the periodic full sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// Delay before the one-shot re-extraction of a non-hydrated node.
    #[serde(default = "default_hydrate_retry")]
    pub hydrate_retry_ms: u64,

    /// Delay between a navigation and the follow-up sweep.
    #[serde(default = "default_nav_settle")]
    pub nav_settle_ms: u64,

    /// Platform tag stamped on harvested items.
    #[serde(default = "default_platform")]
    pub platform: String,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval(),
            hydrate_retry_ms: default_hydrate_retry(),
            nav_settle_ms: default_nav_settle(),
            platform: default_platform(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    4000
}
fn default_hydrate_retry() -> u64 {
    1200
}
fn default_nav_settle() -> u64 {
    600
}
fn default_platform() -> String {
    DEFAULT_PLATFORM.into()
}

/// `[retention]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Days a title stays in the batch without a new sighting.
    #[serde(default = "default_title_days")]
    pub title_days: i64,

    /// Maximum archived pieces.
    #[serde(default = "default_archive_cap")]
    pub archive_cap: usize,

    /// Maximum events kept in the debug log.
    #[serde(default = "default_event_log_cap")]
    pub event_log_cap: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            title_days: default_title_days(),
            archive_cap: default_archive_cap(),
            event_log_cap: default_event_log_cap(),
        }
    }
}

fn default_title_days() -> i64 {
    14
}
fn default_archive_cap() -> usize {
    365
}
fn default_event_log_cap() -> usize {
    500
}

/// `[bridge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Origins allowed to talk to the relay (exact scheme, host and port).
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// How long the orchestrator waits on the relay before going direct.
    #[serde(default = "default_relay_timeout")]
    pub relay_timeout_ms: u64,

    /// Privileged endpoint id for the direct transport. Unset disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            relay_timeout_ms: default_relay_timeout(),
            endpoint_id: None,
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".into(),
        "http://127.0.0.1:5173".into(),
    ]
}
fn default_relay_timeout() -> u64 {
    1500
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the analysis service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User id sent with analysis requests.
    #[serde(default)]
    pub user_id: String,

    /// HTTP timeout for backend calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_id: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5050".into()
}
fn default_timeout_secs() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Harvest config (runtime, derived from the file config)
// ---------------------------------------------------------------------------

/// Shortest timer the pipeline accepts; zero periods are raised to this.
const MIN_TIMER_MS: u64 = 1;

/// Runtime harvest configuration derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub sweep_interval: Duration,
    pub hydrate_retry: Duration,
    pub nav_settle: Duration,
    pub platform: String,
}

impl From<&AppConfig> for HarvestConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            sweep_interval: timer(config.observer.sweep_interval_ms),
            hydrate_retry: timer(config.observer.hydrate_retry_ms),
            nav_settle: timer(config.observer.nav_settle_ms),
            platform: config.observer.platform.clone(),
        }
    }
}

fn timer(ms: u64) -> Duration {
    Duration::from_millis(ms.max(MIN_TIMER_MS))
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.thyself/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ThyselfError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.thyself/thyself.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ThyselfError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| ThyselfError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_timings(&config)?;
    Ok(config)
}

/// Reject zero-length observer and relay timers.
pub fn validate_timings(config: &AppConfig) -> Result<()> {
    let timers = [
        ("observer.sweep_interval_ms", config.observer.sweep_interval_ms),
        ("observer.hydrate_retry_ms", config.observer.hydrate_retry_ms),
        ("observer.nav_settle_ms", config.observer.nav_settle_ms),
        ("bridge.relay_timeout_ms", config.bridge.relay_timeout_ms),
    ];
    match timers.iter().find(|(_, ms)| *ms == 0) {
        Some((name, _)) => Err(ThyselfError::config(format!("{name} must be greater than 0"))),
        None => Ok(()),
    }
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ThyselfError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ThyselfError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ThyselfError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the database path, expanding a leading `~/`.
pub fn resolve_db_path(config: &AppConfig) -> Result<PathBuf> {
    let raw = config.storage.db_path.as_str();
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ThyselfError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

/// Parse and check the analysis backend base URL.
pub fn validate_backend_url(config: &AppConfig) -> Result<Url> {
    let raw = &config.backend.base_url;
    let url = Url::parse(raw)
        .map_err(|e| ThyselfError::config(format!("invalid backend.base_url '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ThyselfError::config(format!(
            "backend.base_url must be http or https, got '{other}'"
        ))),
    }
}
