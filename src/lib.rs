//! Sentinel-2 band-mean time series over a fixed area of interest.
//!
//! Images are filtered by date, bounds and cloud cover, masked to clear
//! water pixels, mosaicked per day and reduced to per-band means; the
//! resulting table is exported as CSV, downloaded and cleaned into a
//! column-ordered dataset.

pub mod bands;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod scl;
pub mod scratch;
pub mod tabular;

pub use error::{PipelineError, Result};
