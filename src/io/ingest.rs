//! CSV ingest of `(volume, energy)` samples.
//!
//! Design goals:
//! - **Strict schema** for the two required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic behavior** (input order is kept)
//! - **Separation of concerns**: no fitting logic here

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::StringRecord;

use crate::data::{compute_stats, reference_dataset};
use crate::domain::{DatasetStats, Sample};
use crate::error::AppError;

/// Accepted header spellings, after lowercasing.
const VOLUME_HEADERS: [&str; 3] = ["volume", "vol", "v"];
const ENERGY_HEADERS: [&str; 3] = ["energy", "e", "etot"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: samples + stats + row errors.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub samples: Vec<Sample>,
    /// Where the samples came from (a path, or `built-in`).
    pub source: String,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

impl IngestedData {
    /// The built-in reference dataset.
    pub fn builtin() -> Result<Self, AppError> {
        Self::from_samples(reference_dataset(), "built-in")
    }

    /// Wrap samples that did not come from a file.
    pub fn from_samples(samples: Vec<Sample>, source: impl Into<String>) -> Result<Self, AppError> {
        let stats = compute_stats(&samples)
            .ok_or_else(|| AppError::new(3, "Dataset has no finite samples."))?;
        let n = samples.len();
        Ok(Self {
            samples,
            source: source.into(),
            stats,
            row_errors: Vec::new(),
            rows_read: n,
            rows_used: n,
        })
    }
}

/// Load samples from a CSV file with `volume` and `energy` columns.
pub fn load_samples(path: &Path) -> Result<IngestedData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_samples(file, path.display().to_string())
}

/// Parse samples from any CSV reader.
pub fn read_samples<R: Read>(input: R, source: impl Into<String>) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let volume_idx = find_column(&header_map, &VOLUME_HEADERS)?;
    let energy_idx = find_column(&header_map, &ENERGY_HEADERS)?;

    let mut samples = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for result in reader.records() {
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                let line = e.position().map_or(rows_read + 1, |p| p.line() as usize);
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        let line = record.position().map_or(rows_read + 1, |p| p.line() as usize);

        match parse_row(&record, volume_idx, energy_idx) {
            Ok(sample) => samples.push(sample),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    let rows_used = samples.len();
    if rows_used == 0 {
        return Err(AppError::new(3, "No valid rows remain after validation."));
    }
    let stats = compute_stats(&samples)
        .ok_or_else(|| AppError::new(3, "No valid samples remain after validation."))?;

    Ok(IngestedData {
        samples,
        source: source.into(),
        stats,
        row_errors,
        rows_read,
        rows_used,
    })
}

/// Write samples as a `volume,energy` CSV.
pub fn write_samples_csv<W: Write>(writer: W, samples: &[Sample]) -> Result<(), AppError> {
    let mut out = csv::Writer::from_writer(writer);
    for s in samples {
        out.serialize(s)
            .map_err(|e| AppError::new(2, format!("Failed to write samples CSV: {e}")))?;
    }
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to write samples CSV: {e}")))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn find_column(header_map: &HashMap<String, usize>, names: &[&str]) -> Result<usize, AppError> {
    names
        .iter()
        .find_map(|n| header_map.get(*n).copied())
        .ok_or_else(|| AppError::new(2, format!("Missing required column: `{}`", names[0])))
}

fn parse_row(record: &StringRecord, volume_idx: usize, energy_idx: usize) -> Result<Sample, String> {
    let volume = parse_field(record, volume_idx, "volume")?;
    let energy = parse_field(record, energy_idx, "energy")?;
    if volume <= 0.0 {
        return Err(format!("volume must be > 0 (got {volume})"));
    }
    Ok(Sample::new(volume, energy))
}

fn parse_field(record: &StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let raw = record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))?;
    let v = raw
        .parse::<f64>()
        .map_err(|_| format!("Invalid number for `{name}`: '{raw}'"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite value for `{name}`: '{raw}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_columns_in_any_order_with_bom() {
        let csv = "\u{feff}Energy, Volume\n-56.29,13.71\n-56.41,14.82\n";
        let data = read_samples(csv.as_bytes(), "inline").unwrap();
        assert_eq!(data.samples, vec![Sample::new(13.71, -56.29), Sample::new(14.82, -56.41)]);
        assert_eq!(data.rows_used, 2);
        assert!(data.row_errors.is_empty());
    }

    #[test]
    fn bad_rows_are_reported_not_fatal() {
        let csv = "volume,energy\n13.71,-56.29\nabc,-56.41\n-1,-56.4\n16.0,\n17.23,-56.463\n";
        let data = read_samples(csv.as_bytes(), "inline").unwrap();
        assert_eq!(data.rows_read, 5);
        assert_eq!(data.rows_used, 2);
        assert_eq!(data.row_errors.len(), 3);
        assert_eq!(data.row_errors[0].line, 3);
        assert!(data.row_errors[0].message.contains("Invalid number"));
    }

    #[test]
    fn missing_column_is_an_input_error() {
        let err = read_samples("volume,pressure\n1,2\n".as_bytes(), "inline").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("energy"));
    }

    #[test]
    fn no_valid_rows_is_insufficient_data() {
        let err = read_samples("v,e\nx,y\n".as_bytes(), "inline").unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn written_samples_read_back() {
        let samples = reference_dataset();
        let mut buf = Vec::new();
        write_samples_csv(&mut buf, &samples).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("volume,energy\n"));
        let data = read_samples(text.as_bytes(), "inline").unwrap();
        assert_eq!(data.samples, samples);
    }
}
