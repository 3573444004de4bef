use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::request_log::DEFAULT_MAX_LEN;
use crate::request_stats::{DEFAULT_DAILY_KEEP, DEFAULT_HOURLY_KEEP};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Directory holding `logs.json` and `stats.json`
    pub data_dir: PathBuf,
    pub request_log: RequestLogConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestLogConfig {
    /// Ring-buffer capacity for individual request records
    pub max_len: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Hour buckets kept by the retention sweep
    pub hourly_keep: usize,
    /// Day buckets kept by the retention sweep
    pub daily_keep: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            request_log: RequestLogConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            hourly_keep: DEFAULT_HOURLY_KEEP,
            daily_keep: DEFAULT_DAILY_KEEP,
        }
    }
}

impl TelemetryConfig {
    pub fn logs_path(&self) -> PathBuf {
        self.data_dir.join("logs.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join("stats.json")
    }
}

/// Load the telemetry configuration from an optional `telemetry` config file
/// and `TELEMETRY__`-prefixed environment variables (e.g.
/// `TELEMETRY__REQUEST_LOG__MAX_LEN=500`). Absent settings use the defaults.
pub fn load_config() -> anyhow::Result<TelemetryConfig> {
    let config = config::Config::builder()
        .add_source(config::File::with_name("telemetry").required(false))
        .add_source(config::Environment::with_prefix("TELEMETRY").separator("__"))
        .build()?;

    let cfg: TelemetryConfig = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &TelemetryConfig) -> anyhow::Result<()> {
    if cfg.request_log.max_len == 0 {
        anyhow::bail!("request_log.max_len must be greater than zero");
    }

    if cfg.stats.hourly_keep == 0 {
        anyhow::bail!("stats.hourly_keep must be greater than zero");
    }

    if cfg.stats.daily_keep == 0 {
        anyhow::bail!("stats.daily_keep must be greater than zero");
    }

    Ok(())
}
