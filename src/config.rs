//! Server configuration.
//!
//! Loaded from a YAML file, then overridden by whichever CLI flags the
//! caller explicitly set (env vars are accepted via `clap`'s `env` attribute
//! as a third, lowest-priority source). Mirrors `LoadConfig` from the
//! original Go service: defaults → file → explicit overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Command-line flags. Anything left `None` falls through to the config
/// file's value, then to the compiled-in default.
#[derive(Debug, Parser)]
#[command(
    name = "flashmetrics",
    about = "Prometheus-compatible remote read/write endpoint backed by a TiDB-class store"
)]
pub struct Cli {
    /// Path to the YAML config file.
    #[arg(
        long = "config.file",
        env = "FLASHMETRICS_CONFIG",
        default_value = "./flashmetrics.yml"
    )]
    pub config_file: PathBuf,

    /// HTTP listen address.
    #[arg(long = "address", env = "FLASHMETRICS_ADDRESS")]
    pub address: Option<String>,

    /// SQL server address.
    #[arg(long = "tidb.address", env = "FLASHMETRICS_TIDB_ADDRESS")]
    pub tidb_address: Option<String>,

    /// Log level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(long = "log.level", env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Log file path; empty means stderr.
    #[arg(long = "log.file")]
    pub log_file: Option<String>,

    /// Drop all four tables on shutdown. Used for integration-test teardown.
    #[arg(long, default_value_t = false)]
    pub cleanup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiDbConfig {
    pub address: String,
}

impl Default for TiDbConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:4000".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9977".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: String,
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,
}

fn default_scrape_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_scrape_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_metrics_path() -> String {
    "/metrics".into()
}

fn default_scheme() -> String {
    "http".into()
}

/// Parse a Prometheus-style duration literal (`"15s"`, `"1m"`, `"2h"`) or a
/// bare integer number of seconds.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration literal: {raw}"))?;
    match unit {
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!("invalid duration unit in {raw}")),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub job_name: String,
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_scrape_interval"
    )]
    pub scrape_interval: Duration,
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_scrape_timeout"
    )]
    pub scrape_timeout: Duration,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub static_configs: Vec<StaticConfig>,
}

/// Fully resolved server configuration (defaults, overlaid by the config
/// file, overlaid by any CLI flag the caller explicitly set).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub tidb: TiDbConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub scrape_configs: Vec<ScrapeConfig>,
    #[serde(default)]
    pub logs: LogConfig,
    #[serde(skip)]
    pub cleanup: bool,
}

impl Config {
    /// Load defaults, overlay the YAML file (if it exists), then overlay
    /// any CLI flag the caller explicitly passed.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut cfg = Self::from_file(&cli.config_file)?;

        if let Some(address) = &cli.address {
            cfg.web.address = address.clone();
        }
        if let Some(tidb_address) = &cli.tidb_address {
            cfg.tidb.address = tidb_address.clone();
        }
        if let Some(log_level) = &cli.log_level {
            cfg.logs.log_level = log_level.clone();
        }
        if let Some(log_file) = &cli.log_file {
            cfg.logs.log_file = log_file.clone();
        }
        cfg.cleanup = cli.cleanup;

        Ok(cfg)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// A configuration suitable for tests against a local TiDB/MySQL instance.
    ///
    /// Bring one up with:
    /// `docker run -d --name flashmetrics-test-tidb -p 4000:4000 pingcap/tidb:latest`
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            tidb: TiDbConfig {
                address: "127.0.0.1:4000".into(),
            },
            web: WebConfig {
                address: "127.0.0.1:0".into(),
            },
            scrape_configs: vec![],
            logs: LogConfig {
                log_level: "debug".into(),
                log_file: String::new(),
            },
            cleanup: true,
        }
    }
}
