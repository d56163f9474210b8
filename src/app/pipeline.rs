//! Shared "fit pipeline" logic.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load samples -> initial guess -> fit -> selection -> residuals
//!
//! The CLI can then focus on presentation.

use log::{info, warn};

use crate::domain::{FitConfig, SampleResidual};
use crate::error::AppError;
use crate::fit::selection::{FitSelection, fit_and_select};
use crate::io::ingest::{IngestedData, load_samples};

/// All computed outputs of a single `eos fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedData,
    pub selection: FitSelection,
    pub residuals: Vec<SampleResidual>,
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    // 1) Load samples (CSV or built-in reference data).
    let ingest = match &config.data_path {
        Some(path) => load_samples(path)?,
        None => IngestedData::builtin()?,
    };
    if !ingest.row_errors.is_empty() {
        warn!(
            "{}: skipped {} of {} rows",
            ingest.source,
            ingest.row_errors.len(),
            ingest.rows_read
        );
    }

    run_fit_on(config, ingest)
}

/// Execute the fitting pipeline on already loaded samples.
pub fn run_fit_on(config: &FitConfig, ingest: IngestedData) -> Result<RunOutput, AppError> {
    info!(
        "fitting {} samples from {} with {}",
        ingest.samples.len(),
        ingest.source,
        config.strategy
    );

    // 2) Initial guess, fit and select the best model per config.
    let selection = fit_and_select(&ingest.samples, config)?;

    // 3) Compute residuals against the chosen fit.
    let residuals = crate::report::compute_residuals(&ingest.samples, &selection.best)?;

    Ok(RunOutput {
        ingest,
        selection,
        residuals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SyntheticSpec, generate_synthetic};
    use crate::domain::{FitStrategy, ModelKind};

    #[test]
    fn default_run_fits_reference_data() {
        let run = run_fit(&FitConfig::default()).unwrap();
        assert_eq!(run.ingest.source, "built-in");
        assert_eq!(run.residuals.len(), 5);
        assert_eq!(run.selection.best.model, ModelKind::Murnaghan);
        assert!(run.residuals.iter().all(|r| r.residual.abs() < 0.01));
    }

    #[test]
    fn missing_data_file_is_an_input_error() {
        let config = FitConfig {
            data_path: Some("/nonexistent/eos-samples.csv".into()),
            ..FitConfig::default()
        };
        assert_eq!(run_fit(&config).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn too_few_samples_map_to_exit_code_3() {
        let samples = generate_synthetic(&SyntheticSpec {
            n_points: 3,
            ..SyntheticSpec::default()
        })
        .unwrap();
        let ingest = IngestedData::from_samples(samples, "synthetic").unwrap();
        let config = FitConfig {
            strategy: FitStrategy::Surrogate,
            ..FitConfig::default()
        };
        assert_eq!(run_fit_on(&config, ingest).unwrap_err().exit_code(), 3);
    }
}
