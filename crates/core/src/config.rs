use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanscopeError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub jaeger_url: String,
    pub jaeger_timeout: Duration,
    pub jaeger_retry_attempts: u32,
    pub jaeger_retry_base_delay: Duration,
    pub http_addr: String,
    pub db_path: PathBuf,
    pub notification_limit: usize,
    pub notification_ttl: Duration,
    pub monitor_interval: Duration,
    pub monitor_initial_delay: Duration,
    pub monitor_error_backoff: Duration,
    pub monitor_error_threshold: u32,
    pub monitor_latency_threshold: Duration,
    pub monitor_alert_cooldown: Duration,
    pub service_map_window: Duration,
    pub service_map_limit: usize,
    pub features: FeatureFlags,
}

/// Switches for the optional API surfaces. Everything is on unless configured otherwise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub service_map: bool,
    pub trace_comparison: bool,
    pub trace_export: bool,
    pub dashboard_analytics: bool,
    pub notifications: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            service_map: true,
            trace_comparison: true,
            trace_export: true,
            dashboard_analytics: true,
            notifications: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_root = env::var("XDG_DATA_HOME")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(home).join(".local/share"));

        Self {
            jaeger_url: "http://127.0.0.1:16686".to_string(),
            jaeger_timeout: Duration::from_secs(15),
            jaeger_retry_attempts: 3,
            jaeger_retry_base_delay: Duration::from_secs(2),
            http_addr: "127.0.0.1:5000".to_string(),
            db_path: data_root.join("spanscope/notifications.duckdb"),
            notification_limit: 100,
            notification_ttl: Duration::from_secs(60 * 60 * 24 * 7),
            monitor_interval: Duration::from_secs(60),
            monitor_initial_delay: Duration::from_secs(10),
            monitor_error_backoff: Duration::from_secs(30),
            monitor_error_threshold: 3,
            monitor_latency_threshold: Duration::from_millis(500),
            monitor_alert_cooldown: Duration::from_secs(60 * 60),
            service_map_window: Duration::from_secs(60 * 60 * 24),
            service_map_limit: 100,
            features: FeatureFlags::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    jaeger_url: Option<String>,
    jaeger_timeout: Option<String>,
    jaeger_retry_attempts: Option<u32>,
    jaeger_retry_base_delay: Option<String>,
    http_addr: Option<String>,
    db_path: Option<PathBuf>,
    notification_limit: Option<usize>,
    notification_ttl: Option<String>,
    monitor_interval: Option<String>,
    monitor_initial_delay: Option<String>,
    monitor_error_backoff: Option<String>,
    monitor_error_threshold: Option<u32>,
    monitor_latency_threshold: Option<String>,
    monitor_alert_cooldown: Option<String>,
    service_map_window: Option<String>,
    service_map_limit: Option<usize>,
    #[serde(default)]
    features: FeatureOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureOverrides {
    service_map: Option<bool>,
    trace_comparison: Option<bool>,
    trace_export: Option<bool>,
    dashboard_analytics: Option<bool>,
    notifications: Option<bool>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("SPANSCOPE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("spanscope/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| SpanscopeError::Config(format!("failed reading {}: {e}", path.display())))?;
    parse_overrides(&raw)
        .map(Some)
        .map_err(|e| SpanscopeError::Config(format!("failed parsing {}: {e}", path.display())))
}

fn parse_overrides(raw: &str) -> std::result::Result<ConfigOverrides, toml::de::Error> {
    toml::from_str(raw)
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        jaeger_url: env::var("SPANSCOPE_JAEGER_URL").ok(),
        jaeger_timeout: env::var("SPANSCOPE_JAEGER_TIMEOUT").ok(),
        jaeger_retry_attempts: env_parsed("SPANSCOPE_JAEGER_RETRY_ATTEMPTS")?,
        jaeger_retry_base_delay: env::var("SPANSCOPE_JAEGER_RETRY_BASE_DELAY").ok(),
        http_addr: env::var("SPANSCOPE_HTTP_ADDR").ok(),
        db_path: env::var("SPANSCOPE_DB_PATH").ok().map(PathBuf::from),
        notification_limit: env_parsed("SPANSCOPE_NOTIFICATION_LIMIT")?,
        notification_ttl: env::var("SPANSCOPE_NOTIFICATION_TTL").ok(),
        monitor_interval: env::var("SPANSCOPE_MONITOR_INTERVAL").ok(),
        monitor_initial_delay: env::var("SPANSCOPE_MONITOR_INITIAL_DELAY").ok(),
        monitor_error_backoff: env::var("SPANSCOPE_MONITOR_ERROR_BACKOFF").ok(),
        monitor_error_threshold: env_parsed("SPANSCOPE_MONITOR_ERROR_THRESHOLD")?,
        monitor_latency_threshold: env::var("SPANSCOPE_MONITOR_LATENCY_THRESHOLD").ok(),
        monitor_alert_cooldown: env::var("SPANSCOPE_MONITOR_ALERT_COOLDOWN").ok(),
        service_map_window: env::var("SPANSCOPE_SERVICE_MAP_WINDOW").ok(),
        service_map_limit: env_parsed("SPANSCOPE_SERVICE_MAP_LIMIT")?,
        features: FeatureOverrides {
            service_map: env_parsed("SPANSCOPE_FEATURE_SERVICE_MAP")?,
            trace_comparison: env_parsed("SPANSCOPE_FEATURE_TRACE_COMPARISON")?,
            trace_export: env_parsed("SPANSCOPE_FEATURE_TRACE_EXPORT")?,
            dashboard_analytics: env_parsed("SPANSCOPE_FEATURE_DASHBOARD_ANALYTICS")?,
            notifications: env_parsed("SPANSCOPE_FEATURE_NOTIFICATIONS")?,
        },
    })
}

fn env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SpanscopeError::Config(format!("bad {name} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn parse_duration_field(field: &str, value: &str, source: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        SpanscopeError::Config(format!("bad {field} in {source}: {e} (value={value})"))
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.jaeger_url {
        cfg.jaeger_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = overrides.jaeger_timeout {
        cfg.jaeger_timeout = parse_duration_field("jaeger_timeout", &v, source)?;
    }
    if let Some(v) = overrides.jaeger_retry_attempts {
        cfg.jaeger_retry_attempts = v;
    }
    if let Some(v) = overrides.jaeger_retry_base_delay {
        cfg.jaeger_retry_base_delay = parse_duration_field("jaeger_retry_base_delay", &v, source)?;
    }
    if let Some(v) = overrides.http_addr {
        cfg.http_addr = v;
    }
    if let Some(v) = overrides.db_path {
        cfg.db_path = v;
    }
    if let Some(v) = overrides.notification_limit {
        if v == 0 {
            return Err(SpanscopeError::Config(format!(
                "bad notification_limit in {source}: must be at least 1"
            )));
        }
        cfg.notification_limit = v;
    }
    if let Some(v) = overrides.notification_ttl {
        cfg.notification_ttl = parse_duration_field("notification_ttl", &v, source)?;
    }
    if let Some(v) = overrides.monitor_interval {
        cfg.monitor_interval = parse_duration_field("monitor_interval", &v, source)?;
    }
    if let Some(v) = overrides.monitor_initial_delay {
        cfg.monitor_initial_delay = parse_duration_field("monitor_initial_delay", &v, source)?;
    }
    if let Some(v) = overrides.monitor_error_backoff {
        cfg.monitor_error_backoff = parse_duration_field("monitor_error_backoff", &v, source)?;
    }
    if let Some(v) = overrides.monitor_error_threshold {
        cfg.monitor_error_threshold = v.max(1);
    }
    if let Some(v) = overrides.monitor_latency_threshold {
        cfg.monitor_latency_threshold =
            parse_duration_field("monitor_latency_threshold", &v, source)?;
    }
    if let Some(v) = overrides.monitor_alert_cooldown {
        cfg.monitor_alert_cooldown = parse_duration_field("monitor_alert_cooldown", &v, source)?;
    }
    if let Some(v) = overrides.service_map_window {
        cfg.service_map_window = parse_duration_field("service_map_window", &v, source)?;
    }
    if let Some(v) = overrides.service_map_limit {
        cfg.service_map_limit = v;
    }

    let features = overrides.features;
    if let Some(v) = features.service_map {
        cfg.features.service_map = v;
    }
    if let Some(v) = features.trace_comparison {
        cfg.features.trace_comparison = v;
    }
    if let Some(v) = features.trace_export {
        cfg.features.trace_export = v;
    }
    if let Some(v) = features.dashboard_analytics {
        cfg.features.dashboard_analytics = v;
    }
    if let Some(v) = features.notifications {
        cfg.features.notifications = v;
    }
    Ok(())
}
