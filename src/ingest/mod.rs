/// Imagery providers.
///
/// - `service`: the capabilities the pipeline depends on.
/// - `expression`: Earth Engine value-graph builders.
/// - `earth_engine`: the live REST client.
/// - `replay`: an in-memory provider over locally held images.

pub mod earth_engine;
pub mod expression;
pub mod replay;
pub mod service;

pub use service::{Download, ImageryService};
