use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use tracing::{trace, warn};

use crate::util::{base_name, normalize_name};

/// Which containers and services are monitored
///
/// Fixed at startup. Deserializes from `"all"` or from a list of names.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "SelectionRepr")]
pub enum Selection {
    All,
    Only(BTreeSet<String>),
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    Mode(String),
    Names(Vec<String>),
}

impl TryFrom<SelectionRepr> for Selection {
    type Error = String;

    fn try_from(value: SelectionRepr) -> Result<Self, Self::Error> {
        match value {
            SelectionRepr::Mode(mode) if mode.eq_ignore_ascii_case("all") => Ok(Selection::All),
            SelectionRepr::Mode(other) => Err(format!(
                "unknown selection mode '{other}' (expected \"all\" or a list of names)"
            )),
            SelectionRepr::Names(names) => Ok(Selection::from_names(names)),
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Only(BTreeSet::new())
    }
}

impl Selection {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Selection::Only(
            names
                .into_iter()
                .map(|name| normalize_name(name.as_ref().trim()).to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }

    /// Parse the `HEALTH_CHECKS` format: `all` or `name;name;...`
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("all") {
            return Selection::All;
        }
        Selection::from_names(value.split(';'))
    }

    /// Whether a container or service name is monitored.
    ///
    /// Swarm replicas (`svc.1.abc`) match through their base name.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(names) => {
                let name = normalize_name(name);
                names.contains(name) || names.contains(base_name(name))
            }
        }
    }

    /// Whether a name is monitored by itself, without base-name matching.
    ///
    /// Health checks use this: a swarm replica is watched through its
    /// service, not as a container of its own.
    pub fn matches_exact(&self, name: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(names) => names.contains(normalize_name(name)),
        }
    }

    /// Explicit names, `None` when everything is monitored
    pub fn names(&self) -> Option<Vec<String>> {
        match self {
            Selection::All => None,
            Selection::Only(names) => Some(names.iter().cloned().collect()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Selection::Only(names) if names.is_empty())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Docker Engine API endpoint: `unix:///var/run/docker.sock` or
    /// `http://127.0.0.1:2375`
    #[serde(default = "default_runtime_endpoint")]
    pub endpoint: String,

    /// Timeout for non-streaming runtime requests (seconds)
    #[serde(default = "default_runtime_timeout")]
    pub timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_runtime_endpoint(),
            timeout_secs: default_runtime_timeout(),
        }
    }
}

impl RuntimeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_runtime_endpoint() -> String {
    "unix:///var/run/docker.sock".to_string()
}

fn default_runtime_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub selection: Selection,

    /// Swarm mode: monitor services and run the task poller
    #[serde(default)]
    pub swarm: bool,

    /// Minimum spacing between two alerts for one entity (seconds)
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Maximum age of a failed swarm task still eligible to alert (seconds)
    #[serde(default = "default_freshness")]
    pub freshness_secs: u64,

    /// Swarm poller tick (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Resubscribe to the event feed after this delay when it closes.
    /// Disabled when absent.
    pub resubscribe_delay_secs: Option<u64>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            selection: Selection::default(),
            swarm: false,
            cooldown_secs: default_cooldown(),
            freshness_secs: default_freshness(),
            poll_interval_ms: default_poll_interval(),
            resubscribe_delay_secs: None,
        }
    }
}

impl MonitoringConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_secs as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn resubscribe_delay(&self) -> Option<Duration> {
        self.resubscribe_delay_secs.map(Duration::from_secs)
    }
}

fn default_cooldown() -> u64 {
    10
}

fn default_freshness() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    1000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SamplerConfig {
    /// Sampler tick (milliseconds)
    #[serde(default = "default_sample_interval")]
    pub interval_ms: u64,

    /// Containers sampled more recently than this are skipped (milliseconds)
    #[serde(default = "default_fresh_window")]
    pub fresh_ms: u64,

    /// Snapshots fetched concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// At most one dashboard push per window (milliseconds)
    #[serde(default = "default_throttle")]
    pub throttle_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sample_interval(),
            fresh_ms: default_fresh_window(),
            batch_size: default_batch_size(),
            throttle_ms: default_throttle(),
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn fresh_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.fresh_ms as i64)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

fn default_sample_interval() -> u64 {
    1000
}

fn default_fresh_window() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    5
}

fn default_throttle() -> u64 {
    2000
}

/// Credentials of a WhatsApp gateway (Evolution, Wuzapi, Meow)
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Gateway {
    pub api: String,
    pub key: String,
    pub number: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

/// Notification sink, chosen once at startup
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "service", rename_all = "lowercase")]
pub enum NotificationConfig {
    Evolution(Gateway),
    Wuzapi(Gateway),
    Meow(Gateway),
    Discord(Discord),
    Webhook(Webhook),
}

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Rows not updated for this many days are deleted
        retention_days: Option<u32>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: None,
        }
    }
}

impl StorageConfig {
    pub fn retention(&self) -> Option<chrono::Duration> {
        match self {
            StorageConfig::None => None,
            StorageConfig::Sqlite { retention_days, .. } => {
                retention_days.map(|days| chrono::Duration::days(days as i64))
            }
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./data/metrics.db")
}

/// API server configuration
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for the dashboard
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth_token: None,
            enable_cors: true,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AlertDisplayConfig {
    /// Offset from UTC used for timestamps in alert texts (minutes)
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl AlertDisplayConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(
                "invalid alert UTC offset of {} minutes, using UTC",
                self.utc_offset_minutes
            );
            Utc.fix()
        })
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Notification sink (alerts are only logged when absent)
    pub notification: Option<NotificationConfig>,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// HTTP/WebSocket API (disabled when absent)
    pub api: Option<ApiConfig>,

    #[serde(default)]
    pub alerts: AlertDisplayConfig,
}

impl Config {
    /// Reject settings the actors cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        let non_zero = [
            ("runtime.timeout_secs", self.runtime.timeout_secs),
            ("monitoring.poll_interval_ms", self.monitoring.poll_interval_ms),
            ("sampler.interval_ms", self.sampler.interval_ms),
        ];

        for (name, value) in non_zero {
            if value == 0 {
                anyhow::bail!("Invalid configuration: {name} must be greater than 0");
            }
        }

        Ok(())
    }

    /// Build the configuration from environment variables (and `.env`).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from a key lookup using the environment
    /// variable names of [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();

        if let Some(checks) = lookup("HEALTH_CHECKS") {
            config.monitoring.selection = Selection::parse(&checks);
        }

        config.monitoring.swarm = lookup("DOCKER_MODE").is_some_and(|mode| mode == "swarm");

        if let Some(host) = lookup("DOCKER_HOST") {
            config.runtime.endpoint = match host.strip_prefix("tcp://") {
                Some(rest) => format!("http://{rest}"),
                None => host,
            };
        }

        config.notification = notification_from_lookup(&lookup);

        if let Some(path) = lookup("DATABASE_PATH") {
            config.storage = Some(if path == "none" {
                StorageConfig::None
            } else {
                StorageConfig::Sqlite {
                    path: PathBuf::from(path),
                    retention_days: None,
                }
            });
        }

        let bind = lookup("API_BIND").and_then(|bind| match bind.parse() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("ignoring invalid API_BIND '{bind}': {e}");
                None
            }
        });
        let token = lookup("API_TOKEN");
        if bind.is_some() || token.is_some() {
            config.api = Some(ApiConfig {
                bind_addr: bind.unwrap_or_else(default_bind_addr),
                auth_token: token,
                enable_cors: true,
            });
        }

        if let Some(offset) = lookup("ALERT_UTC_OFFSET_MINUTES").and_then(|v| v.parse().ok()) {
            config.alerts.utc_offset_minutes = offset;
        }

        trace!("loaded config from environment: {config:?}");
        config
    }
}

fn notification_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Option<NotificationConfig> {
    let service = lookup("NOTIFICATION_SERVICE")?;
    let api = lookup("NOTIFICATION_API").unwrap_or_default();

    let gateway = || Gateway {
        api: api.clone(),
        key: lookup("NOTIFICATION_KEY").unwrap_or_default(),
        number: lookup("NOTIFICATION_NUMBER").unwrap_or_default(),
    };

    match service.as_str() {
        "evolution" => Some(NotificationConfig::Evolution(gateway())),
        "wuzapi" => Some(NotificationConfig::Wuzapi(gateway())),
        "meow" => Some(NotificationConfig::Meow(gateway())),
        "discord" => Some(NotificationConfig::Discord(Discord {
            url: api.clone(),
            user_id: lookup("NOTIFICATION_USER_ID"),
        })),
        "webhook" => Some(NotificationConfig::Webhook(Webhook { url: api.clone() })),
        other => {
            warn!("notification service '{other}' not implemented, alerts will only be logged");
            None
        }
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    config.validate()?;

    trace!("loaded config: {config:?}");
    Ok(config)
}
