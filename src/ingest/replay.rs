/// In-memory imagery provider for offline runs and tests.
///
/// Holds a fixed set of images with explicit pixel grids and evaluates
/// every stage eagerly with the same semantics as the remote service:
///
/// - `filterDate` is start-inclusive, end-exclusive
/// - `mosaic` puts the last image of the day on top
/// - `reduceRegion(mean)` ignores masked pixels and omits bands with none
/// - the CSV export lists `system:index`, properties sorted by name, `.geo`
///
/// Pixels are taken to already be the AOI sample at the requested scale,
/// so `aoi` and `scale_m` only matter to the remote provider.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::error::{PipelineError, Result};
use crate::ingest::service::{Download, ImageryService};
use crate::model::{Aoi, CollectionQuery, DailyMosaic, Image, MeanRecord, DATE_PROPERTY, SCL_BAND};
use crate::scl::SclMask;

/// `.geo` cell written for geometry-less features.
pub const EMPTY_GEOMETRY: &str = r#"{"type":"MultiPoint","coordinates":[]}"#;

const URL_PREFIX: &str = "replay://tables/";

/// A collection is either raw captures or date-tagged mosaics.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayCollection {
    Images(Vec<Image>),
    Mosaics(Vec<DailyMosaic>),
}

pub struct ReplayService {
    images: Vec<Image>,
    exports: RefCell<HashMap<String, Vec<u8>>>,
}

impl ReplayService {
    pub fn new(images: Vec<Image>) -> Self {
        Self {
            images,
            exports: RefCell::new(HashMap::new()),
        }
    }
}

/// Convenience constructor for a capture.
pub fn scene(
    id: &str,
    acquired: DateTime<Utc>,
    footprint: Aoi,
    cloudy_pixel_percentage: f64,
    bands: &[(&str, Vec<Option<f64>>)],
) -> Image {
    Image {
        id: id.to_string(),
        acquired,
        footprint,
        cloudy_pixel_percentage,
        bands: bands
            .iter()
            .map(|(name, pixels)| (name.to_string(), pixels.clone()))
            .collect(),
    }
}

// ============================================================================
// Stage implementations
// ============================================================================

fn select_bands(mut image: Image, bands: &[String]) -> Image {
    image.bands.retain(|name, _| bands.contains(name));
    image
}

fn mask_image(mut image: Image, mask: &SclMask) -> Image {
    let scl = image.bands.get(SCL_BAND).cloned().unwrap_or_default();
    let keep: Vec<bool> = (0..image.pixel_count())
        .map(|i| mask.keeps(scl.get(i).copied().flatten()))
        .collect();

    for pixels in image.bands.values_mut() {
        for (pixel, keep) in pixels.iter_mut().zip(&keep) {
            if !keep {
                *pixel = None;
            }
        }
    }
    image
}

/// Per-pixel composite where later images overwrite earlier ones wherever
/// they have a valid value.
fn composite(id: String, day: &[&Image]) -> Option<Image> {
    let first = day.first()?;
    let mut bands: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();

    for image in day {
        for (name, pixels) in &image.bands {
            let merged = bands.entry(name.clone()).or_default();
            if merged.len() < pixels.len() {
                merged.resize(pixels.len(), None);
            }
            for (slot, value) in merged.iter_mut().zip(pixels) {
                if value.is_some() {
                    *slot = *value;
                }
            }
        }
    }

    Some(Image {
        id,
        acquired: first.acquired,
        footprint: first.footprint,
        cloudy_pixel_percentage: first.cloudy_pixel_percentage,
        bands,
    })
}

fn band_means(image: &Image) -> BTreeMap<String, f64> {
    image
        .bands
        .iter()
        .filter_map(|(name, pixels)| {
            let valid: Vec<f64> = pixels.iter().flatten().copied().collect();
            if valid.is_empty() {
                None
            } else {
                Some((name.clone(), valid.iter().sum::<f64>() / valid.len() as f64))
            }
        })
        .collect()
}

/// Earth-Engine-shaped CSV for a feature table.
pub fn render_csv(records: &[MeanRecord]) -> Result<Vec<u8>> {
    let mut properties: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.means.keys().map(String::as_str))
        .collect();
    // An empty table has no properties at all, so not even `Date`.
    if !records.is_empty() {
        properties.insert(DATE_PROPERTY);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["system:index"];
    header.extend(properties.iter().copied());
    header.push(".geo");
    writer.write_record(&header)?;

    for (index, record) in records.iter().enumerate() {
        let mut row = vec![index.to_string()];
        for property in &properties {
            let cell = if *property == DATE_PROPERTY {
                record.date.clone()
            } else {
                record.means.get(*property).map(|v| v.to_string()).unwrap_or_default()
            };
            row.push(cell);
        }
        row.push(EMPTY_GEOMETRY.to_string());
        writer.write_record(&row)?;
    }

    writer.into_inner().map_err(|e| PipelineError::Io(e.into_error()))
}

impl ImageryService for ReplayService {
    type Collection = ReplayCollection;
    type Table = Vec<MeanRecord>;

    fn query(&self, query: &CollectionQuery) -> Result<ReplayCollection> {
        let selected = query.selected_bands();
        let images = self
            .images
            .iter()
            .filter(|img| query.range.contains(img.acquired))
            .filter(|img| img.footprint.intersects(&query.aoi))
            .filter(|img| img.cloudy_pixel_percentage < query.max_cloudy_pixel_percentage)
            .map(|img| select_bands(img.clone(), &selected))
            .collect();
        Ok(ReplayCollection::Images(images))
    }

    fn apply_mask(&self, collection: ReplayCollection, mask: &SclMask) -> Result<ReplayCollection> {
        Ok(match collection {
            ReplayCollection::Images(images) => {
                ReplayCollection::Images(images.into_iter().map(|img| mask_image(img, mask)).collect())
            }
            ReplayCollection::Mosaics(mosaics) => ReplayCollection::Mosaics(
                mosaics
                    .into_iter()
                    .map(|m| DailyMosaic { date: m.date, image: mask_image(m.image, mask) })
                    .collect(),
            ),
        })
    }

    fn mosaic_by_date(&self, collection: ReplayCollection) -> Result<ReplayCollection> {
        let images = match collection {
            ReplayCollection::Images(images) => images,
            ReplayCollection::Mosaics(mosaics) => mosaics.into_iter().map(|m| m.image).collect(),
        };

        // distinct dates in first-seen order
        let mut dates: Vec<String> = Vec::new();
        for image in &images {
            let tag = image.date_tag();
            if !dates.contains(&tag) {
                dates.push(tag);
            }
        }

        let mosaics = dates
            .into_iter()
            .enumerate()
            .filter_map(|(index, date)| {
                let day: Vec<&Image> = images.iter().filter(|img| img.date_tag() == date).collect();
                composite(index.to_string(), &day).map(|image| DailyMosaic { date, image })
            })
            .collect();
        Ok(ReplayCollection::Mosaics(mosaics))
    }

    fn reduce_means(&self, collection: ReplayCollection, _aoi: &Aoi, _scale_m: f64) -> Result<Vec<MeanRecord>> {
        let records = match collection {
            ReplayCollection::Mosaics(mosaics) => mosaics
                .iter()
                .map(|m| MeanRecord { date: m.date.clone(), means: band_means(&m.image) })
                .collect(),
            ReplayCollection::Images(images) => images
                .iter()
                .map(|img| MeanRecord { date: img.date_tag(), means: band_means(img) })
                .collect(),
        };
        Ok(records)
    }

    fn export_csv(&self, table: Vec<MeanRecord>) -> Result<String> {
        let body = render_csv(&table)?;
        let mut exports = self.exports.borrow_mut();
        let url = format!("{}{}", URL_PREFIX, exports.len());
        exports.insert(url.clone(), body);
        Ok(url)
    }
}

impl Download for ReplayService {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.exports
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownUrl(url.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DateRange;
    use chrono::{NaiveDate, TimeZone};

    const AOI: Aoi = Aoi { lon_min: -95.0, lat_min: 38.8, lon_max: -94.9, lat_max: 38.9 };

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn query(bands: &[&str]) -> CollectionQuery {
        CollectionQuery {
            collection: "COPERNICUS/S2_SR_HARMONIZED".into(),
            range: DateRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            },
            aoi: AOI,
            max_cloudy_pixel_percentage: 20.0,
            bands: bands.iter().map(|b| b.to_string()).collect(),
        }
    }

    fn water_scene(id: &str, when: DateTime<Utc>, b2: Vec<Option<f64>>) -> Image {
        let scl = vec![Some(6.0); b2.len()];
        scene(id, when, AOI, 5.0, &[("B2", b2), ("SCL", scl)])
    }

    #[test]
    fn test_query_filters_date_bounds_and_cloud() {
        let far_away = Aoi { lon_min: 10.0, lat_min: 10.0, lon_max: 11.0, lat_max: 11.0 };
        let service = ReplayService::new(vec![
            water_scene("in", at(2024, 1, 5, 17), vec![Some(0.1)]),
            water_scene("on-end-date", at(2024, 2, 1, 0), vec![Some(0.1)]),
            scene("elsewhere", at(2024, 1, 5, 17), far_away, 0.0, &[("B2", vec![Some(0.1)])]),
            scene("cloudy", at(2024, 1, 6, 17), AOI, 20.0, &[("B2", vec![Some(0.1)])]),
        ]);

        let ReplayCollection::Images(images) = service.query(&query(&["B2"])).unwrap() else {
            panic!("expected images");
        };
        let ids: Vec<&str> = images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["in"]);
    }

    #[test]
    fn test_query_selects_bands_plus_scl() {
        let service = ReplayService::new(vec![scene(
            "a",
            at(2024, 1, 5, 17),
            AOI,
            1.0,
            &[("B2", vec![Some(0.1)]), ("B3", vec![Some(0.2)]), ("SCL", vec![Some(6.0)])],
        )]);
        let ReplayCollection::Images(images) = service.query(&query(&["B3"])).unwrap() else {
            panic!("expected images");
        };
        let names: Vec<&String> = images[0].bands.keys().collect();
        assert_eq!(names, vec!["B3", "SCL"]);
    }

    #[test]
    fn test_masks_keep_only_clear_water() {
        // pixel classes: water, cloud-high, vegetation, cloud-shadow, water
        let image = scene(
            "a",
            at(2024, 1, 5, 17),
            AOI,
            1.0,
            &[
                ("B2", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)]),
                ("SCL", vec![Some(6.0), Some(9.0), Some(4.0), Some(3.0), Some(6.0)]),
            ],
        );
        let service = ReplayService::new(vec![]);
        let mut collection = ReplayCollection::Images(vec![image]);
        for mask in crate::scl::mask_sequence() {
            collection = service.apply_mask(collection, &mask).unwrap();
        }
        let ReplayCollection::Images(images) = collection else { panic!("expected images") };
        assert_eq!(images[0].bands["B2"], vec![Some(1.0), None, None, None, Some(5.0)]);
    }

    #[test]
    fn test_mosaic_one_per_date_last_on_top() {
        let service = ReplayService::new(vec![]);
        let collection = ReplayCollection::Images(vec![
            water_scene("t1", at(2024, 1, 5, 16), vec![Some(1.0), Some(1.0)]),
            water_scene("other-day", at(2024, 1, 7, 16), vec![Some(9.0), Some(9.0)]),
            water_scene("t2", at(2024, 1, 5, 17), vec![None, Some(2.0)]),
        ]);
        let ReplayCollection::Mosaics(mosaics) = service.mosaic_by_date(collection).unwrap() else {
            panic!("expected mosaics");
        };
        let dates: Vec<&str> = mosaics.iter().map(|m| m.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-05", "2024-01-07"]);
        // t2 wins where it has data, t1 shows through where t2 is masked
        assert_eq!(mosaics[0].image.bands["B2"], vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_means_skip_masked_pixels_and_empty_bands() {
        let service = ReplayService::new(vec![]);
        let image = scene(
            "a",
            at(2024, 1, 5, 17),
            AOI,
            1.0,
            &[("B2", vec![Some(0.2), None, Some(0.4)]), ("B3", vec![None, None, None])],
        );
        let collection = ReplayCollection::Mosaics(vec![DailyMosaic { date: "2024-01-05".into(), image }]);
        let records = service.reduce_means(collection, &AOI, 10.0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, "2024-01-05");
        assert!((records[0].means["B2"] - 0.3).abs() < 1e-12);
        assert!(!records[0].means.contains_key("B3"));
    }

    #[test]
    fn test_export_is_served_by_download() {
        let service = ReplayService::new(vec![]);
        let records = vec![
            MeanRecord {
                date: "2024-01-05".into(),
                means: [("B2".to_string(), 0.5), ("B11".to_string(), 0.25)].into_iter().collect(),
            },
            MeanRecord { date: "2024-01-07".into(), means: BTreeMap::new() },
        ];
        let url = service.export_csv(records).unwrap();
        assert!(url.starts_with(URL_PREFIX));

        let body = String::from_utf8(service.fetch(&url).unwrap()).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "system:index,B11,B2,Date,.geo");
        assert!(lines[1].starts_with("0,0.25,0.5,2024-01-05,"));
        assert!(lines[2].starts_with("1,,,2024-01-07,"));
        assert!(matches!(service.fetch("replay://tables/99"), Err(PipelineError::UnknownUrl(_))));
    }

    #[test]
    fn test_empty_export_has_only_bookkeeping_columns() {
        let service = ReplayService::new(vec![]);
        let url = service.export_csv(vec![]).unwrap();
        let body = String::from_utf8(service.fetch(&url).unwrap()).unwrap();
        assert_eq!(body.trim_end(), "system:index,.geo");
    }
}
