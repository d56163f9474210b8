//! Export per-sample results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::SampleResidual;
use crate::error::AppError;

/// Write per-sample results to a CSV file.
pub fn write_results_csv(path: &Path, residuals: &[SampleResidual]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_results(file, residuals)
}

/// Write `volume,energy_obs,energy_fit,residual` rows to any writer.
pub fn write_results<W: Write>(mut out: W, residuals: &[SampleResidual]) -> Result<(), AppError> {
    writeln!(out, "volume,energy_obs,energy_fit,residual")
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for r in residuals {
        writeln!(
            out,
            "{:.6},{:.8},{:.8},{:.8}",
            r.sample.volume, r.sample.energy, r.energy_fit, r.residual,
        )
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    Ok(())
}
