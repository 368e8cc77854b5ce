/// The band-mean pipeline, one function call per stage.
///
/// query → cloud mask → water mask → daily mosaic → spatial mean →
/// CSV export → download → column cleanup
///
/// Everything runs synchronously on the calling thread. Each stage consumes
/// the previous stage's output exactly once. The imagery provider and the
/// downloader are injected, so the same sequence runs against Earth Engine
/// or against `ingest::replay`.

use crate::bands;
use crate::config::Config;
use crate::error::Result;
use crate::ingest::{Download, ImageryService};
use crate::logging::{self, Stage};
use crate::model::{CollectionQuery, DateRange, RunSummary};
use crate::scl;
use crate::scratch;
use crate::tabular;

/// Collection filter described by the configuration.
pub fn build_query(config: &Config) -> CollectionQuery {
    CollectionQuery {
        collection: config.query.collection.clone(),
        range: DateRange {
            start: config.query.start_date,
            end: config.query.end_date,
        },
        aoi: config.region,
        max_cloudy_pixel_percentage: config.query.max_cloudy_pixel_percentage,
        bands: config.query.bands.clone(),
    }
}

/// Run `f`, logging its error against `tag` before passing it on.
fn stage<T>(tag: Stage, operation: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    f().inspect_err(|e| logging::log_stage_failure(tag, operation, e))
}

pub fn run<S, D>(service: &S, download: &D, config: &Config) -> Result<RunSummary>
where
    S: ImageryService,
    D: Download + ?Sized,
{
    let query = build_query(config);
    logging::info(
        Stage::Query,
        Some(query.collection.as_str()),
        &format!(
            "{} .. {} over [{}, {}, {}, {}], cloud < {}%",
            query.range.start,
            query.range.end,
            query.aoi.lon_min,
            query.aoi.lat_min,
            query.aoi.lon_max,
            query.aoi.lat_max,
            query.max_cloudy_pixel_percentage
        ),
    );
    for name in &query.bands {
        match bands::find_band(name) {
            Some(band) => logging::debug(Stage::Query, None, &band.summary()),
            None => logging::warn(Stage::Query, Some(name.as_str()), "not a known Sentinel-2 band"),
        }
    }
    if let Some(native) = bands::finest_resolution_m(&query.bands) {
        logging::debug(
            Stage::Query,
            None,
            &format!("scale {} m, finest native band resolution {} m", config.query.scale_m, native),
        );
    }

    let mut collection = stage(Stage::Query, "collection query", || service.query(&query))?;

    for mask in scl::mask_sequence() {
        logging::debug(
            Stage::Mask,
            Some(mask.name),
            &format!("{:?} SCL classes {:?}", mask.mode, mask.class_values()),
        );
        collection = stage(Stage::Mask, mask.name, || service.apply_mask(collection, &mask))?;
    }

    let mosaics = stage(Stage::Mosaic, "daily mosaic", || service.mosaic_by_date(collection))?;

    let table = stage(Stage::Reduce, "mean reduction", || {
        service.reduce_means(mosaics, &query.aoi, config.query.scale_m)
    })?;

    let url = stage(Stage::Export, "CSV export", || service.export_csv(table))?;
    logging::debug(Stage::Export, None, &format!("download URL {}", url));

    let body = stage(Stage::Fetch, "download", || download.fetch(&url))?;
    logging::info(Stage::Fetch, None, &format!("downloaded {} bytes", body.len()));

    let scratch = stage(Stage::Fetch, "write scratch CSV", || {
        scratch::write_scratch(&config.output.scratch_csv, &body)
    })?;

    let output = &config.output.dataset_csv;
    let summary = stage(Stage::Cleanup, "column cleanup", || {
        tabular::clean_file(&scratch, output)
    })?;
    if let Err(e) = scratch.close() {
        logging::warn(
            Stage::Cleanup,
            Some(config.output.scratch_csv.to_string_lossy().as_ref()),
            &format!("could not remove scratch file: {}", e),
        );
    }

    logging::log_run_summary(summary.rows, &summary.columns, &output.to_string_lossy());

    Ok(RunSummary {
        rows: summary.rows,
        columns: summary.columns,
        output: output.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_build_query_copies_config() {
        let config = Config::from_toml_str(
            r#"
            [project]
            id = "p"
            [region]
            lon_min = 1.0
            lat_min = 2.0
            lon_max = 3.0
            lat_max = 4.0
            [query]
            collection = "COPERNICUS/S2_SR_HARMONIZED"
            bands = ["B4", "B8"]
            start_date = "2020-06-01"
            end_date = "2020-07-01"
            max_cloudy_pixel_percentage = 35.0
            "#,
        )
        .unwrap();

        let query = build_query(&config);
        assert_eq!(query.collection, "COPERNICUS/S2_SR_HARMONIZED");
        assert_eq!(query.range.start, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
        assert_eq!(query.range.end, NaiveDate::from_ymd_opt(2020, 7, 1).unwrap());
        assert_eq!(query.aoi.lat_max, 4.0);
        assert_eq!(query.max_cloudy_pixel_percentage, 35.0);
        assert_eq!(query.bands, vec!["B4", "B8"]);
    }
}
