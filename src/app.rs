//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads samples (CSV or built-in)
//! - runs the initial guess, fitting and model selection
//! - prints reports/plots
//! - writes optional exports

use std::io::Write;

use clap::Parser;
use log::info;

use crate::cli::{Command, FitArgs, PlotArgs, SynthArgs};
use crate::data::{SyntheticSpec, generate_synthetic};
use crate::domain::{FitConfig, ParameterVector};
use crate::error::AppError;
use crate::fit::{LeastSquaresConfig, SurrogateConfig};

pub mod pipeline;

/// Entry point for the `eos` binary.
pub fn run() -> Result<(), AppError> {
    // `eos` and `eos --model auto` behave like `eos fit ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Synth(args) => handle_synth(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args);
    let run = pipeline::run_fit(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.ingest, &run.selection, &config)
    );
    println!("{}", crate::report::format_residual_table(&run.residuals));

    if config.plot {
        let plot = crate::plot::render_ascii_plot(
            &run.ingest.samples,
            &run.selection.best,
            config.plot_width,
            config.plot_height,
        );
        println!("{plot}");
    }

    // Optional exports.
    if let Some(path) = &config.export_results {
        crate::io::export::write_results_csv(path, &run.residuals)?;
        info!("wrote results CSV {}", path.display());
    }
    if let Some(path) = &config.export_curve {
        crate::io::curve::write_curve_json(path, &run.selection.best, &run.ingest.stats)?;
        info!("wrote curve JSON {}", path.display());
    }

    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let spec = SyntheticSpec {
        model: args.model,
        params: ParameterVector::new(args.e0, args.b0, args.bp, args.v0),
        volume_min: args.vmin,
        volume_max: args.vmax,
        n_points: args.points,
        noise_sd: args.noise,
        seed: args.seed,
    };
    let samples = generate_synthetic(&spec)?;

    match &args.out {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", path.display())))?;
            crate::io::ingest::write_samples_csv(file, &samples)?;
            info!("wrote {} samples to {}", samples.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            crate::io::ingest::write_samples_csv(&mut lock, &samples)?;
            lock.flush()
                .map_err(|e| AppError::new(2, format!("Failed to write samples: {e}")))?;
        }
    }
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let curve = crate::io::curve::read_curve_json(&args.curve)?;
    let samples = match &args.data {
        Some(path) => crate::io::ingest::load_samples(path)?.samples,
        None => Vec::new(),
    };

    let plot = crate::plot::render_ascii_plot_from_curve_file(&samples, &curve, args.width, args.height);
    println!(
        "{} ({}) {}",
        curve.model.display_name(),
        curve.strategy,
        curve.params
    );
    println!("{plot}");
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    FitConfig {
        data_path: args.data.clone(),
        model_spec: args.model,
        strategy: args.strategy,
        least_squares: LeastSquaresConfig {
            patience: args.patience,
            ftol: args.ftol,
            xtol: args.xtol,
            gtol: args.gtol,
            ..LeastSquaresConfig::default()
        },
        surrogate: SurrogateConfig {
            iterations: args.bo_iterations,
            initial_points: args.bo_initial_points,
            candidates: args.bo_candidates,
            span: args.bo_span,
            tolerance: args.bo_tolerance,
            patience: args.bo_patience,
            seed: args.seed,
            ..SurrogateConfig::default()
        },
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_results: args.export.clone(),
        export_curve: args.export_curve.clone(),
    }
}

/// Rewrite argv so `eos` defaults to `eos fit`.
///
/// Rules:
/// - `eos`                      -> `eos fit`
/// - `eos --model auto ...`     -> `eos fit --model auto ...`
/// - `eos --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("fit".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "fit" | "synth" | "plot");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "fit flags".
    if arg1.starts_with('-') {
        argv.insert(1, "fit".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitStrategy, ModelSpec};

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_defaults_to_fit() {
        assert_eq!(rewrite_args(argv(&["eos"])), argv(&["eos", "fit"]));
        assert_eq!(
            rewrite_args(argv(&["eos", "--model", "auto"])),
            argv(&["eos", "fit", "--model", "auto"])
        );
        assert_eq!(rewrite_args(argv(&["eos", "--help"])), argv(&["eos", "--help"]));
        assert_eq!(rewrite_args(argv(&["eos", "synth"])), argv(&["eos", "synth"]));
    }

    #[test]
    fn fit_args_become_config() {
        let cli = crate::cli::Cli::parse_from(rewrite_args(argv(&[
            "eos",
            "--strategy",
            "surrogate",
            "--bo-tol",
            "1e-9",
            "--patience",
            "50",
            "--no-plot",
        ])));
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = fit_config_from_args(&args);
        assert_eq!(config.strategy, FitStrategy::Surrogate);
        assert_eq!(config.model_spec, ModelSpec::Murnaghan);
        assert_eq!(config.least_squares.patience, 50);
        assert_eq!(config.surrogate.tolerance, Some(1e-9));
        assert_eq!(config.surrogate.iterations, 30);
        assert!(!config.plot);
        assert!(config.data_path.is_none());
    }
}
