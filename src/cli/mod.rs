//! Command-line parsing for the EOS fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{FitStrategy, ModelKind, ModelSpec};
use crate::fit::DEFAULT_TOL;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "eos", version, about = "Energy-volume equation of state fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit an EOS to volume/energy samples, print diagnostics, and optionally plot/export.
    Fit(FitArgs),
    /// Write a synthetic `volume,energy` CSV from known parameters.
    Synth(SynthArgs),
    /// Plot a previously exported curve JSON.
    Plot(PlotArgs),
}

/// Options for fitting.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// CSV with `volume` and `energy` columns (defaults to the built-in dataset).
    #[arg(short = 'd', long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Which model(s) to fit.
    #[arg(short = 'm', long, value_enum, default_value_t = ModelSpec::Murnaghan)]
    pub model: ModelSpec,

    /// Fitting strategy.
    #[arg(short = 's', long, value_enum, default_value_t = FitStrategy::LeastSquares)]
    pub strategy: FitStrategy,

    /// Least squares: evaluation budget, in multiples of (parameters + 1).
    #[arg(long, default_value_t = 200)]
    pub patience: usize,

    /// Least squares: relative SSE reduction tolerance.
    #[arg(long, default_value_t = DEFAULT_TOL)]
    pub ftol: f64,

    /// Least squares: relative step tolerance.
    #[arg(long, default_value_t = DEFAULT_TOL)]
    pub xtol: f64,

    /// Least squares: orthogonality (gradient) tolerance (0 disables).
    #[arg(long, default_value_t = 0.0)]
    pub gtol: f64,

    /// Surrogate: acquisition iterations after the initial design.
    #[arg(long = "bo-iters", default_value_t = 30)]
    pub bo_iterations: usize,

    /// Surrogate: Latin-hypercube points in the initial design.
    #[arg(long = "bo-init", default_value_t = 8)]
    pub bo_initial_points: usize,

    /// Surrogate: candidates scored per iteration.
    #[arg(long = "bo-candidates", default_value_t = 2048)]
    pub bo_candidates: usize,

    /// Surrogate: relative half-width of the search box around the initial guess.
    #[arg(long = "bo-span", default_value_t = 0.25)]
    pub bo_span: f64,

    /// Surrogate: stop early once the best SSE stops improving by more than this.
    #[arg(long = "bo-tol")]
    pub bo_tolerance: Option<f64>,

    /// Surrogate: iterations without improvement allowed under `--bo-tol`.
    #[arg(long = "bo-patience", default_value_t = 5)]
    pub bo_patience: usize,

    /// Surrogate: random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Render an ASCII plot in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Export per-sample results to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export curve (model + params + fitted grid) to JSON.
    #[arg(long = "export-curve")]
    pub export_curve: Option<PathBuf>,
}

/// Options for synthetic data generation.
#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Output CSV (stdout when omitted).
    #[arg(short = 'o', long)]
    pub out: Option<PathBuf>,

    /// Generating model.
    #[arg(short = 'm', long, value_enum, default_value_t = ModelKind::Murnaghan)]
    pub model: ModelKind,

    #[arg(long, default_value_t = -56.46, allow_hyphen_values = true)]
    pub e0: f64,

    #[arg(long, default_value_t = 0.5)]
    pub b0: f64,

    #[arg(long, default_value_t = 4.0)]
    pub bp: f64,

    #[arg(long, default_value_t = 16.5)]
    pub v0: f64,

    /// Smallest volume on the grid.
    #[arg(long, default_value_t = 13.5)]
    pub vmin: f64,

    /// Largest volume on the grid.
    #[arg(long, default_value_t = 19.5)]
    pub vmax: f64,

    /// Number of grid points.
    #[arg(short = 'n', long, default_value_t = 9)]
    pub points: usize,

    /// Std of Gaussian noise added to each energy.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Options for plotting a saved curve.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Curve JSON file produced by `eos fit --export-curve`.
    #[arg(long, value_name = "JSON")]
    pub curve: PathBuf,

    /// Optional samples CSV to overlay on the curve.
    #[arg(short = 'd', long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_flags_parse() {
        let cli = Cli::parse_from([
            "eos", "fit", "--model", "auto", "--strategy", "surrogate", "--bo-iters", "5", "--no-plot",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.model, ModelSpec::Auto);
        assert_eq!(args.strategy, FitStrategy::Surrogate);
        assert_eq!(args.bo_iterations, 5);
        assert!(args.no_plot);
    }

    #[test]
    fn synth_accepts_negative_e0() {
        let cli = Cli::parse_from(["eos", "synth", "--e0", "-10.5", "--model", "vinet"]);
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        assert_eq!(args.e0, -10.5);
        assert_eq!(args.model, ModelKind::Vinet);
    }
}
