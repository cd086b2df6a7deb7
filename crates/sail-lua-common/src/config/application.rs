use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::config::deserialize_non_zero;
use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// Environment variable prefix for configuration overrides.
/// `SAIL_LUA__SCAN__BATCH_SIZE=1024` sets `scan.batch_size`.
pub const CONFIG_ENV_PREFIX: &str = "SAIL_LUA__";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub scan: ScanConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Loads the embedded defaults merged with environment overrides.
    pub fn load() -> CommonResult<Self> {
        Self::extract(
            Figment::from(Toml::string(DEFAULT_CONFIG)).admerge(
                Env::prefixed(CONFIG_ENV_PREFIX).map(|p| p.as_str().replace("__", ".").into()),
            ),
        )
    }

    /// Loads the embedded defaults only, ignoring the environment.
    pub fn defaults() -> CommonResult<Self> {
        Self::extract(Figment::from(Toml::string(DEFAULT_CONFIG)))
    }

    fn extract(figment: Figment) -> CommonResult<Self> {
        figment
            .extract()
            .map_err(|e| CommonError::invalid(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub sandbox: bool,
    #[serde(deserialize_with = "deserialize_non_zero")]
    pub memory_limit: Option<usize>,
    pub max_table_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    pub batch_size: usize,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    pub default_log_filter: String,
}
