/// Run configuration loaded from a TOML file.
///
/// The file supplies the Earth Engine project, the AOI, the band list and
/// the source collection. Everything else has defaults that reproduce the
/// historical Kansas run. See `sentinel.toml` at the repository root.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::logging::LogLevel;
use crate::model::Aoi;

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "SENTINEL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "sentinel.toml";

/// Environment variable holding an OAuth2 access token for Earth Engine.
/// Obtaining the token is left to the caller (e.g. `gcloud auth print-access-token`).
pub const ACCESS_TOKEN_ENV: &str = "EE_ACCESS_TOKEN";

pub const DEFAULT_API_BASE_URL: &str = "https://earthengine.googleapis.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    pub region: Aoi,
    pub query: QueryConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub collection: String,
    pub bands: Vec<String>,
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
    #[serde(default = "default_end_date")]
    pub end_date: NaiveDate,
    #[serde(default = "default_cloud_threshold")]
    pub max_cloudy_pixel_percentage: f64,
    #[serde(default = "default_scale")]
    pub scale_m: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_scratch_csv")]
    pub scratch_csv: PathBuf,
    #[serde(default = "default_dataset_csv")]
    pub dataset_csv: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            scratch_csv: default_scratch_csv(),
            dataset_csv: default_dataset_csv(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            timestamps: false,
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 3, 28).unwrap_or_default()
}

fn default_end_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 12).unwrap_or_default()
}

fn default_cloud_threshold() -> f64 {
    20.0
}

fn default_scale() -> f64 {
    10.0
}

fn default_scratch_csv() -> PathBuf {
    PathBuf::from("temp_kansas.csv")
}

fn default_dataset_csv() -> PathBuf {
    PathBuf::from("dataset/sentinel.csv")
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Config {
    /// Parse and validate a configuration document.
    pub fn from_toml_str(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural sanity only. The date range order is left to the
    /// imagery service, where an inverted range yields an empty result.
    pub fn validate(&self) -> Result<()> {
        if self.project.id.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("project.id is empty".into()));
        }
        if self.query.collection.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("query.collection is empty".into()));
        }
        if self.query.bands.is_empty() {
            return Err(PipelineError::InvalidConfig("query.bands is empty".into()));
        }
        if !(self.query.scale_m > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "query.scale_m must be positive, got {}",
                self.query.scale_m
            )));
        }
        if !(0.0..=100.0).contains(&self.query.max_cloudy_pixel_percentage) {
            return Err(PipelineError::InvalidConfig(format!(
                "query.max_cloudy_pixel_percentage must be within 0..=100, got {}",
                self.query.max_cloudy_pixel_percentage
            )));
        }
        Ok(())
    }
}

/// Load the configuration file at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let text = std::fs::read_to_string(path.as_ref())?;
    Config::from_toml_str(&text)
}

/// Config file path from `SENTINEL_CONFIG`, falling back to `sentinel.toml`.
pub fn config_path_from_env() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn access_token_from_env() -> Result<String> {
    std::env::var(ACCESS_TOKEN_ENV).map_err(|_| PipelineError::MissingEnv(ACCESS_TOKEN_ENV))
}
