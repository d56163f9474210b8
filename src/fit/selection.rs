//! Model selection (Murnaghan vs Birch-Murnaghan vs Vinet) using BIC.
//!
//! The tool fits each requested model from the same initial guess and computes:
//! - SSE / RMSE
//! - BIC = n * ln(SSE/n) + k * ln(n)
//!
//! Selection rules:
//! 1. In `auto` mode, skip models that would be underdetermined: require `n >= k + 1`
//! 2. Models whose fit fails are skipped with the reason
//! 3. Choose the model with minimum BIC; ties keep the earlier model kind

use log::{info, warn};

use crate::domain::{FitConfig, FitResult, ModelKind, ParameterVector, Sample};
use crate::error::EosError;
use crate::fit::fitter::{build_fitter, validate_samples};
use crate::fit::guess::initial_guess;

/// Minimum number of extra observations beyond parameter count.
const MIN_N_BUFFER: usize = 1;

/// Output of fitting + selection.
#[derive(Debug, Clone)]
pub struct FitSelection {
    pub initial_guess: ParameterVector,
    pub best: FitResult,
    /// Fits for all attempted models that succeeded.
    pub fits: Vec<FitResult>,
    /// Any models that were skipped and why (for diagnostics).
    pub skipped: Vec<(ModelKind, String)>,
}

/// Build the initial guess, fit every requested model and select the best.
///
/// A single requested model propagates its own error unchanged. In `auto`
/// mode failures are collected in `skipped` and only an empty result is an
/// error (the last failure, or [`EosError::InsufficientData`]).
pub fn fit_and_select(samples: &[Sample], config: &FitConfig) -> Result<FitSelection, EosError> {
    validate_samples(samples)?;
    let guess = initial_guess(samples)?;
    info!("initial guess {guess}");

    let fitter = build_fitter(config);
    let n = samples.len();
    let single = config.model_spec.is_single();

    let mut fits = Vec::new();
    let mut skipped = Vec::new();
    let mut last_error = None;

    for kind in config.model_spec.kinds() {
        let k = kind.param_count();
        if !single && n < k + MIN_N_BUFFER {
            skipped.push((
                kind,
                format!("Underdetermined: n={n} < k+{MIN_N_BUFFER}={}", k + MIN_N_BUFFER),
            ));
            continue;
        }

        match fitter.fit(kind, &guess, samples) {
            Ok(fit) => {
                info!(
                    "{} {kind}: sse={:.6e} bic={:.3}",
                    fitter.strategy(),
                    fit.quality.sse,
                    fit.quality.bic
                );
                fits.push(fit);
            }
            Err(e) if single => return Err(e),
            Err(e) => {
                warn!("{kind} skipped: {e}");
                skipped.push((kind, e.to_string()));
                last_error = Some(e);
            }
        }
    }

    let Some(best) = select_by_bic(&fits) else {
        return Err(last_error.unwrap_or(EosError::InsufficientData {
            what: "samples",
            needed: ModelKind::Murnaghan.param_count() + MIN_N_BUFFER,
            found: n,
        }));
    };

    Ok(FitSelection {
        initial_guess: guess,
        best,
        fits,
        skipped,
    })
}

/// Lowest BIC wins; on a tie the earlier fit is kept.
pub fn select_by_bic(fits: &[FitResult]) -> Option<FitResult> {
    let (first, rest) = fits.split_first()?;
    let mut best = first;
    for f in rest {
        if f.quality.bic < best.quality.bic {
            best = f;
        }
    }
    Some(best.clone())
}
