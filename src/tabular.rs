//! Cleanup of the raw band-mean export.
//!
//! The export carries bookkeeping columns and lists properties in whatever
//! order the service chose. The cleaned table is
//!
//!   `Date`, present bands in canonical order, every other column
//!
//! with `system:index`, `SCL` and `.geo` dropped. Cells are copied as text,
//! so values are never reformatted and a rerun produces identical bytes.
//! Rows stay in export order.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::bands::canonical_rank;
use crate::error::{PipelineError, Result};
use crate::model::DATE_PROPERTY;

/// Columns that never reach the output.
pub const EXCLUDED_COLUMNS: [&str; 3] = ["system:index", "SCL", ".geo"];

#[derive(Debug, Clone, PartialEq)]
pub struct CleanSummary {
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Indices of the input columns to write, in output order.
///
/// Bands outside the canonical list are not treated specially: they fall
/// into the trailing group in their original relative order.
pub fn order_columns(headers: &[&str]) -> Result<Vec<usize>> {
    let date = headers
        .iter()
        .position(|h| *h == DATE_PROPERTY)
        .ok_or_else(|| PipelineError::MissingColumn(DATE_PROPERTY.to_string()))?;

    let mut bands: Vec<(usize, usize)> = headers
        .iter()
        .enumerate()
        .filter_map(|(index, name)| canonical_rank(name).map(|rank| (rank, index)))
        .collect();
    bands.sort_unstable();

    let mut order = vec![date];
    order.extend(bands.iter().map(|(_, index)| *index));

    let others = headers.iter().enumerate().filter(|(_, name)| {
        **name != DATE_PROPERTY && canonical_rank(name).is_none() && !EXCLUDED_COLUMNS.contains(*name)
    });
    order.extend(others.map(|(index, _)| index));

    Ok(order)
}

/// Stream `input` through the column reordering into `output`.
///
/// An input with no header row at all produces an empty output. A table the
/// service exported with no features has only bookkeeping columns; with no
/// rows to lose, that becomes a `Date`-only header rather than an error.
pub fn clean_csv<R: Read, W: Write>(input: R, output: W) -> Result<CleanSummary> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(input);
    let headers = reader.headers()?.clone();

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(output);

    if headers.is_empty() {
        writer.flush()?;
        return Ok(CleanSummary { rows: 0, columns: Vec::new() });
    }

    let names: Vec<&str> = headers.iter().collect();
    let mut records = reader.records().peekable();
    let order = match order_columns(&names) {
        Ok(order) => order,
        Err(PipelineError::MissingColumn(_)) if records.peek().is_none() => {
            writer.write_record([DATE_PROPERTY])?;
            writer.flush()?;
            return Ok(CleanSummary { rows: 0, columns: vec![DATE_PROPERTY.to_string()] });
        }
        Err(e) => return Err(e),
    };
    let columns: Vec<String> = order.iter().map(|&i| names[i].to_string()).collect();

    writer.write_record(&columns)?;

    let mut rows = 0;
    for record in records {
        let record = record?;
        writer.write_record(order.iter().map(|&i| record.get(i).unwrap_or("")))?;
        rows += 1;
    }
    writer.flush()?;

    Ok(CleanSummary { rows, columns })
}

/// Clean the CSV at `src` into `dst`, overwriting `dst`. The parent
/// directory of `dst` must already exist.
pub fn clean_file(src: &Path, dst: &Path) -> Result<CleanSummary> {
    let input = BufReader::new(File::open(src)?);
    let output = BufWriter::new(File::create(dst)?);
    clean_csv(input, output)
}
