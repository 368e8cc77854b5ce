/// Capabilities the pipeline needs from an imagery provider.
///
/// The provider is stateful and remote; the pipeline only ever hands its
/// own opaque values back to it. `Collection` and `Table` are whatever the
/// provider uses to represent an image collection and a feature table:
/// a lazy expression graph for Earth Engine, concrete pixels for replay.

use crate::error::{PipelineError, Result};
use crate::model::{Aoi, CollectionQuery};
use crate::scl::SclMask;

pub trait ImageryService {
    type Collection;
    type Table;

    /// Images of the collection inside the query's date range, intersecting
    /// the AOI and below the cloud threshold, restricted to the query's
    /// bands plus `SCL`.
    fn query(&self, query: &CollectionQuery) -> Result<Self::Collection>;

    /// Apply one SCL mask to every image.
    fn apply_mask(&self, collection: Self::Collection, mask: &SclMask) -> Result<Self::Collection>;

    /// One composite per distinct capture date, tagged with `Date`.
    fn mosaic_by_date(&self, collection: Self::Collection) -> Result<Self::Collection>;

    /// Best-effort per-band mean over `aoi` at `scale_m`, one feature per
    /// mosaic, each carrying the mosaic's `Date`.
    fn reduce_means(&self, collection: Self::Collection, aoi: &Aoi, scale_m: f64) -> Result<Self::Table>;

    /// Request a CSV export of the table and return its download URL.
    fn export_csv(&self, table: Self::Table) -> Result<String>;
}

/// Synchronous retrieval of a download URL's body.
pub trait Download {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

impl Download for reqwest::blocking::Client {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).send()?;

        if !response.status().is_success() {
            return Err(PipelineError::HttpStatus(response.status().as_u16()));
        }

        Ok(response.bytes()?.to_vec())
    }
}
