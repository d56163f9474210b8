//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{FitConfig, FitResult, ParameterVector, SampleResidual};
use crate::fit::selection::FitSelection;
use crate::io::ingest::IngestedData;
use crate::models::derived_quantities;

/// Row errors listed in full before the summary truncates them.
const MAX_ROW_ERRORS_SHOWN: usize = 5;

/// Format the full run summary (dataset stats + fit diagnostics + chosen model).
pub fn format_run_summary(ingest: &IngestedData, selection: &FitSelection, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== eos - Equation of State Fit ===\n");
    out.push_str(&format!(
        "Data: {} | rows used {}/{}\n",
        ingest.source, ingest.rows_used, ingest.rows_read
    ));
    out.push_str(&format!(
        "Points: n={} | V=[{:.3}, {:.3}] | E=[{:.4}, {:.4}]\n",
        ingest.stats.n_points,
        ingest.stats.volume_min,
        ingest.stats.volume_max,
        ingest.stats.energy_min,
        ingest.stats.energy_max
    ));
    for e in ingest.row_errors.iter().take(MAX_ROW_ERRORS_SHOWN) {
        out.push_str(&format!("  (row {}) {}\n", e.line, e.message));
    }
    if ingest.row_errors.len() > MAX_ROW_ERRORS_SHOWN {
        out.push_str(&format!(
            "  ... {} more row errors\n",
            ingest.row_errors.len() - MAX_ROW_ERRORS_SHOWN
        ));
    }
    out.push_str(&format!("Strategy: {}\n", config.strategy));
    out.push_str(&format!("Initial guess: {}\n", fmt_params(&selection.initial_guess)));

    out.push_str("\nModel diagnostics:\n");
    for fit in &selection.fits {
        let chosen = if fit.model == selection.best.model { "*" } else { " " };
        out.push_str(&format!(
            "{chosen} {:<16} SSE={:.3e} RMSE={:.3e} BIC={:.3} iters={}{}\n",
            fit.model.display_name(),
            fit.quality.sse,
            fit.quality.rmse,
            fit.quality.bic,
            fit.diagnostics.iterations,
            fit.diagnostics
                .stop_reason
                .map(|r| format!(" ({r})"))
                .unwrap_or_default(),
        ));
    }
    for (kind, reason) in &selection.skipped {
        out.push_str(&format!("  (skipped {}) {reason}\n", kind.display_name()));
    }

    out.push_str("\nChosen model:\n");
    out.push_str(&format_fit_details(&selection.best));
    out.push('\n');

    out
}

/// Parameters (with standard errors when known) and derived quantities.
pub fn format_fit_details(fit: &FitResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("- {} ({})\n", fit.model.display_name(), fit.strategy));

    let values = fit.params.to_array();
    for (i, name) in ParameterVector::NAMES.iter().enumerate() {
        let se = fit
            .diagnostics
            .std_errors
            .as_ref()
            .and_then(|s| s.get(i))
            .map(|s| format!(" ± {s:.6}"))
            .unwrap_or_default();
        out.push_str(&format!("- {name:<2} = {:.6}{se}\n", values[i]));
    }

    let d = derived_quantities(&fit.params);
    out.push_str(&format!("- B0 = {:.2} GPa\n", d.b0_gpa));
    out.push_str(&format!("- V0^(1/3) = {:.4}\n", d.cube_root_v0));
    out.push_str(&format!("- a(fcc) = (4 V0)^(1/3) = {:.4}\n", d.fcc_lattice_constant));

    if let Some(first) = fit.diagnostics.best_history.first() {
        let last = fit.diagnostics.best_history.last().unwrap_or(first);
        out.push_str(&format!(
            "- surrogate best SSE: {first:.3e} -> {last:.3e} over {} evaluations\n",
            fit.diagnostics.evaluations
        ));
    }

    out
}

/// Per-sample observed vs fitted energies.
pub fn format_residual_table(rows: &[SampleResidual]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>10} {:>14} {:>14} {:>12}\n",
            "volume", "energy_obs", "energy_fit", "residual"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<10} {:-<14} {:-<14} {:-<12}\n", "", "", "", "").trim_end());
    out.push('\n');

    for r in rows {
        out.push_str(
            format!(
                "{:>10.3} {:>14.6} {:>14.6} {:>12.6}\n",
                r.sample.volume, r.sample.energy, r.energy_fit, r.residual
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn fmt_params(p: &ParameterVector) -> String {
    let parts: Vec<String> = ParameterVector::NAMES
        .iter()
        .zip(p.to_array())
        .map(|(name, x)| format!("{name}={x:.6}"))
        .collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitDiagnostics, FitQuality, FitState, FitStrategy, ModelKind, Sample};
    use crate::io::ingest::IngestedData;

    fn fit(model: ModelKind, sse: f64) -> FitResult {
        let params = ParameterVector::new(-56.468, 0.572, 2.74, 16.56);
        FitResult {
            model,
            strategy: FitStrategy::LeastSquares,
            params,
            state: FitState::Converged { params },
            quality: FitQuality::from_sse(sse, 5, 4),
            diagnostics: FitDiagnostics {
                iterations: 4,
                std_errors: Some(vec![0.001, 0.01, 0.1, 0.02]),
                ..FitDiagnostics::default()
            },
        }
    }

    #[test]
    fn summary_marks_chosen_model_and_skips() {
        let ingest = IngestedData::builtin().unwrap();
        let selection = FitSelection {
            initial_guess: ParameterVector::new(-56.47, 0.66, 4.0, 16.71),
            best: fit(ModelKind::Vinet, 1e-6),
            fits: vec![fit(ModelKind::Murnaghan, 1e-5), fit(ModelKind::Vinet, 1e-6)],
            skipped: vec![(ModelKind::BirchMurnaghan, "singular update".to_string())],
        };
        let text = format_run_summary(&ingest, &selection, &FitConfig::default());

        assert!(text.contains("Data: built-in | rows used 5/5"));
        assert!(text.contains("* Vinet"));
        assert!(text.contains("  Murnaghan"));
        assert!(text.contains("(skipped Birch-Murnaghan) singular update"));
        assert!(text.contains("E0 = -56.468000 ± 0.001000"));
        assert!(text.contains("B0 = 91.64 GPa"));
    }

    #[test]
    fn residual_table_layout() {
        let rows = vec![SampleResidual {
            sample: Sample::new(16.0, -56.46),
            energy_fit: -56.4675,
            residual: 0.0075,
        }];
        let table = format_residual_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "    volume     energy_obs     energy_fit     residual");
        assert_eq!(lines[2], "    16.000     -56.460000     -56.467500     0.007500");
    }
}
