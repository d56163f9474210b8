//! Read/write curve JSON files.
//!
//! Curve JSON is the "portable" representation of a fitted EOS:
//! - model kind, strategy and parameters `(E0, B0, BP, V0)`
//! - fit quality and derived quantities
//! - a precomputed fitted grid for quick plotting
//!
//! The schema is defined by `domain::CurveFile`.

use std::fs::File;
use std::path::Path;

use chrono::Local;

use crate::domain::{CurveFile, CurveGrid, DatasetStats, FitResult};
use crate::error::AppError;
use crate::models::{FittedCurve, derived_quantities};

/// Points in the exported fitted grid.
pub const CURVE_GRID_POINTS: usize = 101;

/// Assemble the curve file for a fit over the sampled volume range.
pub fn build_curve_file(best: &FitResult, stats: &DatasetStats) -> Result<CurveFile, AppError> {
    let (volume, energy) = build_grid(best, stats.volume_min, stats.volume_max, CURVE_GRID_POINTS)?;
    Ok(CurveFile {
        tool: "eos".to_string(),
        generated: Local::now(),
        model: best.model,
        strategy: best.strategy,
        params: best.params,
        fit_quality: best.quality.clone(),
        derived: derived_quantities(&best.params),
        grid: CurveGrid { volume, energy },
    })
}

/// Write a curve JSON file.
pub fn write_curve_json(path: &Path, best: &FitResult, stats: &DatasetStats) -> Result<(), AppError> {
    let curve = build_curve_file(best, stats)?;
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create curve JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(file, &curve)
        .map_err(|e| AppError::new(2, format!("Failed to write curve JSON: {e}")))?;

    Ok(())
}

/// Read a curve JSON file.
pub fn read_curve_json(path: &Path) -> Result<CurveFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open curve JSON '{}': {e}", path.display())))?;
    let curve: CurveFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid curve JSON: {e}")))?;
    if curve.grid.volume.len() != curve.grid.energy.len() {
        return Err(AppError::new(2, "Invalid curve JSON: grid columns differ in length."));
    }
    Ok(curve)
}

fn build_grid(best: &FitResult, v_min: f64, v_max: f64, n: usize) -> Result<(Vec<f64>, Vec<f64>), AppError> {
    let mut v0 = v_min;
    let mut v1 = v_max;
    if !(v0.is_finite() && v1.is_finite()) || v1 < v0 {
        v0 = best.params.v0 * 0.8;
        v1 = best.params.v0 * 1.2;
    }
    // A single distinct volume still gets a visible window.
    if (v1 - v0).abs() < 1e-9 {
        v0 *= 0.95;
        v1 *= 1.05;
    }

    let points = FittedCurve::from(best).sample(v0, v1, n)?;
    Ok(points.into_iter().unzip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{compute_stats, reference_dataset};
    use crate::domain::{FitDiagnostics, FitQuality, FitState, FitStrategy, ModelKind, ParameterVector};

    fn fit() -> FitResult {
        let params = ParameterVector::new(-56.468, 0.572, 2.74, 16.56);
        FitResult {
            model: ModelKind::Murnaghan,
            strategy: FitStrategy::LeastSquares,
            params,
            state: FitState::Converged { params },
            quality: FitQuality::from_sse(1e-5, 5, 4),
            diagnostics: FitDiagnostics::default(),
        }
    }

    #[test]
    fn grid_spans_sampled_volumes() {
        let stats = compute_stats(&reference_dataset()).unwrap();
        let curve = build_curve_file(&fit(), &stats).unwrap();
        assert_eq!(curve.grid.volume.len(), CURVE_GRID_POINTS);
        assert_eq!(curve.grid.volume[0], 13.71);
        assert!((curve.grid.volume[100] - 18.52).abs() < 1e-12);
        assert!((curve.derived.b0_gpa - 0.572 * 160.21766208).abs() < 1e-9);
    }

    #[test]
    fn curve_json_round_trips_through_a_file() {
        let stats = compute_stats(&reference_dataset()).unwrap();
        let path = std::env::temp_dir().join(format!("eos-curve-{}.json", std::process::id()));
        write_curve_json(&path, &fit(), &stats).unwrap();
        let back = read_curve_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(back.tool, "eos");
        assert_eq!(back.model, ModelKind::Murnaghan);
        assert_eq!(back.params, fit().params);
        assert_eq!(back.grid.energy.len(), CURVE_GRID_POINTS);
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let err = read_curve_json(Path::new("/nonexistent/eos-curve.json")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
