/// Core data types for the Sentinel-2 band-mean series.
///
/// This module defines the shared domain model imported by all other modules.
/// Apart from a few geometric/date helpers it contains no logic and no I/O.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Coordinate reference system of every AOI in this crate.
pub const AOI_CRS: &str = "EPSG:4326";

/// Name of the scene classification band.
pub const SCL_BAND: &str = "SCL";

/// Name of the per-mosaic date property (and output column).
pub const DATE_PROPERTY: &str = "Date";

/// Day-granularity format used for `Date` tags.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// Area of interest: a planar lon/lat rectangle in `AOI_CRS`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aoi {
    pub lon_min: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lat_max: f64,
}

impl Aoi {
    /// Corner coordinates in the `[lon_min, lat_min, lon_max, lat_max]`
    /// order expected by rectangle constructors.
    pub fn corners(&self) -> [f64; 4] {
        [self.lon_min, self.lat_min, self.lon_max, self.lat_max]
    }

    /// True if the two rectangles share at least one point.
    pub fn intersects(&self, other: &Aoi) -> bool {
        self.lon_min <= other.lon_max
            && other.lon_min <= self.lon_max
            && self.lat_min <= other.lat_max
            && other.lat_min <= self.lat_max
    }
}

/// Acquisition window. `start` is inclusive, `end` exclusive, matching the
/// imagery service's `filterDate`. Order is deliberately not checked: an
/// inverted range simply matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        day >= self.start && day < self.end
    }
}

/// Spatial/temporal/cloud-cover filter against a remote image collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionQuery {
    pub collection: String,
    pub range: DateRange,
    pub aoi: Aoi,
    /// Images must have `CLOUDY_PIXEL_PERCENTAGE` strictly below this.
    pub max_cloudy_pixel_percentage: f64,
    /// Spectral bands to keep; `SCL` is always selected in addition.
    pub bands: Vec<String>,
}

impl CollectionQuery {
    /// Bands selected from each image: the requested bands plus `SCL`.
    pub fn selected_bands(&self) -> Vec<String> {
        let mut selected = self.bands.clone();
        if !selected.iter().any(|b| b == SCL_BAND) {
            selected.push(SCL_BAND.to_string());
        }
        selected
    }
}

// ---------------------------------------------------------------------------
// Image types
// ---------------------------------------------------------------------------

/// A single capture. Pixels are stored per band on a shared flat grid;
/// `None` is a masked (or no-data) pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub footprint: Aoi,
    pub cloudy_pixel_percentage: f64,
    pub bands: BTreeMap<String, Vec<Option<f64>>>,
}

impl Image {
    /// Capture date formatted as a `Date` tag.
    pub fn date_tag(&self) -> String {
        self.acquired.format(DATE_FORMAT).to_string()
    }

    /// Number of pixels in the grid (the longest band).
    pub fn pixel_count(&self) -> usize {
        self.bands.values().map(Vec::len).max().unwrap_or(0)
    }
}

/// One composite per calendar date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyMosaic {
    /// `YYYY-MM-DD`
    pub date: String,
    pub image: Image,
}

/// Spatial means of one daily mosaic. Bands without any valid pixel over
/// the AOI are absent from `means`.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanRecord {
    pub date: String,
    pub means: BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Run result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub rows: usize,
    pub columns: Vec<String>,
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn aoi(lon_min: f64, lat_min: f64, lon_max: f64, lat_max: f64) -> Aoi {
        Aoi { lon_min, lat_min, lon_max, lat_max }
    }

    #[test]
    fn test_aoi_intersection() {
        let kansas = aoi(-95.0, 38.8, -94.9, 38.9);
        assert!(kansas.intersects(&aoi(-95.5, 38.0, -94.95, 38.85)));
        assert!(kansas.intersects(&kansas));
        assert!(!kansas.intersects(&aoi(-94.8, 38.8, -94.7, 38.9)));
        // touching edges count as intersecting
        assert!(kansas.intersects(&aoi(-94.9, 38.9, -94.0, 39.5)));
    }

    #[test]
    fn test_date_range_is_half_open() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        };
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 1, 2, 23, 59, 59).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2023, 12, 31, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_inverted_range_matches_nothing() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        };
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_selected_bands_appends_scl_once() {
        let mut query = CollectionQuery {
            collection: "COPERNICUS/S2_SR_HARMONIZED".into(),
            range: DateRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            },
            aoi: aoi(0.0, 0.0, 1.0, 1.0),
            max_cloudy_pixel_percentage: 20.0,
            bands: vec!["B2".into(), "B3".into()],
        };
        assert_eq!(query.selected_bands(), vec!["B2", "B3", "SCL"]);

        query.bands.push("SCL".into());
        assert_eq!(query.selected_bands(), vec!["B2", "B3", "SCL"]);
    }
}
