/// Error type shared by every pipeline stage.
///
/// There is no recovery path anywhere in the pipeline: each variant is
/// propagated to `main`, logged, and terminates the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Environment variable {0} must be set")]
    MissingEnv(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    HttpStatus(u16),

    #[error("Earth Engine error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Unknown download URL: {0}")]
    UnknownUrl(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
