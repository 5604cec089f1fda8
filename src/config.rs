use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::geo::Coordinates;
use crate::kiss_client::{KissClientConfig, KissClientConfigBuilder};

pub const DEFAULT_CONFIG_PATH: &str = "tnc-tracker.toml";

// Upper bounds keep every interval representable as a timer deadline
const MAX_RECONNECT_INTERVAL_MS: u64 = 60 * 60 * 1000;
const MAX_STATS_INTERVAL_SECS: u64 = 24 * 60 * 60;
const MAX_PRUNE_INTERVAL_HOURS: u64 = 24 * 366;
const MAX_RETENTION_DAYS: u32 = 100 * 366;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KissConfig {
    pub host: String,
    pub port: u16,
    pub reconnect_interval_ms: u64,
}

impl Default for KissConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8001,
            reconnect_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data/stations.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

/// The receiving station; distance and bearing are measured from here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub callsign: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            callsign: "NOCALL".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub retention_days: u32,
    pub prune_interval_hours: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_days: 7,
            prune_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus exporter port; no exporter when unset
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Service configuration: TOML file, then environment overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub kiss: KissConfig,
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub station: StationConfig,
    pub history: HistoryConfig,
    pub stats: StatsConfig,
    pub metrics: MetricsConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Load config from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {:?}; using defaults", path);
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: AppConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Load the file, apply process environment overrides and validate
    pub fn from_file_and_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    ///
    /// Values that do not parse are ignored with a warning and the existing
    /// setting is kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("KISS_HOST") {
            self.kiss.host = host;
        }
        override_parsed(&lookup, "KISS_PORT", &mut self.kiss.port);
        override_parsed(
            &lookup,
            "KISS_RECONNECT_MS",
            &mut self.kiss.reconnect_interval_ms,
        );

        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = path;
        }

        if let Some(host) = lookup("WEB_HOST") {
            self.web.host = host;
        }
        override_parsed(&lookup, "WEB_PORT", &mut self.web.port);

        override_parsed(&lookup, "STATION_LATITUDE", &mut self.station.latitude);
        override_parsed(&lookup, "STATION_LONGITUDE", &mut self.station.longitude);
        if let Some(callsign) = lookup("STATION_CALLSIGN") {
            self.station.callsign = callsign;
        }

        override_parsed(
            &lookup,
            "HISTORY_RETENTION_DAYS",
            &mut self.history.retention_days,
        );
        override_parsed(
            &lookup,
            "HISTORY_PRUNE_INTERVAL_HOURS",
            &mut self.history.prune_interval_hours,
        );
        override_parsed(&lookup, "STATS_INTERVAL_SECS", &mut self.stats.interval_secs);

        if let Some(raw) = lookup("METRICS_PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.metrics.port = Some(port),
                Err(_) => warn!("Ignoring invalid METRICS_PORT value {:?}", raw),
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.log.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.kiss.host.trim().is_empty() {
            bail!("kiss.host must not be empty");
        }
        if self.kiss.port == 0 {
            bail!("kiss.port must not be 0");
        }
        if self.kiss.reconnect_interval_ms == 0 {
            bail!("kiss.reconnect_interval_ms must be greater than 0");
        }
        if self.kiss.reconnect_interval_ms > MAX_RECONNECT_INTERVAL_MS {
            bail!(
                "kiss.reconnect_interval_ms must be at most {}",
                MAX_RECONNECT_INTERVAL_MS
            );
        }
        if self.database.path.trim().is_empty() {
            bail!("database.path must not be empty");
        }
        if self.web.host.trim().is_empty() {
            bail!("web.host must not be empty");
        }
        if !(-90.0..=90.0).contains(&self.station.latitude) {
            bail!("station.latitude {} is out of range", self.station.latitude);
        }
        if !(-180.0..=180.0).contains(&self.station.longitude) {
            bail!("station.longitude {} is out of range", self.station.longitude);
        }
        if self.history.retention_days == 0 {
            bail!("history.retention_days must be greater than 0");
        }
        if self.history.retention_days > MAX_RETENTION_DAYS {
            bail!(
                "history.retention_days must be at most {}",
                MAX_RETENTION_DAYS
            );
        }
        if self.history.prune_interval_hours == 0 {
            bail!("history.prune_interval_hours must be greater than 0");
        }
        if self.history.prune_interval_hours > MAX_PRUNE_INTERVAL_HOURS {
            bail!(
                "history.prune_interval_hours must be at most {}",
                MAX_PRUNE_INTERVAL_HOURS
            );
        }
        if self.stats.interval_secs == 0 {
            bail!("stats.interval_secs must be greater than 0");
        }
        if self.stats.interval_secs > MAX_STATS_INTERVAL_SECS {
            bail!(
                "stats.interval_secs must be at most {}",
                MAX_STATS_INTERVAL_SECS
            );
        }
        Ok(())
    }

    pub fn kiss_client_config(&self) -> KissClientConfig {
        KissClientConfigBuilder::new()
            .host(self.kiss.host.clone())
            .port(self.kiss.port)
            .reconnect_interval(Duration::from_millis(self.kiss.reconnect_interval_ms))
            .build()
    }

    /// Resolve the listen address. `web.host` may be an IP literal (IPv6
    /// without brackets) or a hostname.
    pub async fn web_address(&self) -> Result<SocketAddr> {
        let host = self.web.host.trim();
        tokio::net::lookup_host((host, self.web.port))
            .await
            .with_context(|| format!("Failed to resolve web host {}", host))?
            .next()
            .with_context(|| format!("Web host {} resolved to no addresses", host))
    }

    pub fn station_location(&self) -> Coordinates {
        Coordinates::new(self.station.latitude, self.station.longitude)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats.interval_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.history.prune_interval_hours.saturating_mul(3600))
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => warn!("Ignoring invalid {} value {:?}", key, raw),
    }
}
