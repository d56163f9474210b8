//! Gaussian-process Bayesian optimization of the SSE over a parameter box.
//!
//! Loop:
//!
//! 1. Evaluate the initial guess plus a Latin-hypercube design.
//! 2. Fit GP hyperparameters to `ln(SSE)` of every observation so far.
//! 3. Score a candidate set by Expected Improvement and take the best.
//! 4. Evaluate the true SSE there and append it.
//!
//! Inputs are mapped to the unit cube through [`ParameterBounds`]. Points
//! where the model cannot be evaluated are dropped before training.

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal as StandardNormal};

use crate::domain::{
    FailureReason, FitDiagnostics, FitLifecycle, FitQuality, FitResult, FitState, FitStrategy,
    ModelKind, ParameterVector, Sample, StopReason,
};
use crate::error::{EosError, FitFailure};
use crate::fit::fitter::{ParameterFitter, residuals, sse, validate_samples};
use crate::math::gp::{GaussianProcess, GpHyperparameters, HyperFitOptions, optimize_hyperparameters};
use crate::math::sampling::{latin_hypercube, uniform_point};

const DIM: usize = ParameterVector::LEN;

/// Default BP search interval when the guess lies inside it.
const BP_RANGE: (f64, f64) = (1.5, 7.0);

/// Axis-aligned search box in parameter space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub lower: ParameterVector,
    pub upper: ParameterVector,
}

impl ParameterBounds {
    pub fn new(lower: ParameterVector, upper: ParameterVector) -> Result<Self, EosError> {
        for ((lo, hi), name) in lower
            .to_array()
            .iter()
            .zip(upper.to_array())
            .zip(ParameterVector::NAMES)
        {
            if !(lo.is_finite() && hi.is_finite() && *lo < hi) {
                return Err(EosError::InvalidConfig(format!(
                    "Bounds for {name} must be finite with lower < upper (got [{lo}, {hi}])."
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    /// Box centred on `guess`.
    ///
    /// - `E0`: ± the sample energy range
    /// - `B0`, `V0`: ± `span` times the guessed value
    /// - `BP`: `[1.5, 7]`, or ± `span` around the guess when it lies outside
    pub fn around(guess: &ParameterVector, samples: &[Sample], span: f64) -> Result<Self, EosError> {
        let (e_min, e_max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                (lo.min(s.energy), hi.max(s.energy))
            });
        let e_half = if e_max > e_min { e_max - e_min } else { half_width(guess.e0, span) };
        let b_half = half_width(guess.b0, span);
        let v_half = half_width(guess.v0, span);
        let (bp_lo, bp_hi) = if (BP_RANGE.0..=BP_RANGE.1).contains(&guess.bp) {
            BP_RANGE
        } else {
            let h = half_width(guess.bp, span);
            (guess.bp - h, guess.bp + h)
        };

        Self::new(
            ParameterVector::new(guess.e0 - e_half, guess.b0 - b_half, bp_lo, guess.v0 - v_half),
            ParameterVector::new(guess.e0 + e_half, guess.b0 + b_half, bp_hi, guess.v0 + v_half),
        )
    }

    pub fn contains(&self, p: &ParameterVector) -> bool {
        let (lo, hi, x) = (self.lower.to_array(), self.upper.to_array(), p.to_array());
        (0..DIM).all(|i| lo[i] <= x[i] && x[i] <= hi[i])
    }

    /// Map into `[0, 1]^4`, clipping points outside the box.
    pub fn to_unit(&self, p: &ParameterVector) -> Vec<f64> {
        let (lo, hi, x) = (self.lower.to_array(), self.upper.to_array(), p.to_array());
        (0..DIM)
            .map(|i| ((x[i] - lo[i]) / (hi[i] - lo[i])).clamp(0.0, 1.0))
            .collect()
    }

    pub fn from_unit(&self, u: &[f64]) -> ParameterVector {
        let (lo, hi) = (self.lower.to_array(), self.upper.to_array());
        let mut out = [0.0; DIM];
        for i in 0..DIM {
            out[i] = lo[i] + u[i] * (hi[i] - lo[i]);
        }
        ParameterVector::from(out)
    }
}

fn half_width(x: f64, span: f64) -> f64 {
    span * x.abs().max(1e-3)
}

/// Settings for [`SurrogateOptimizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateConfig {
    /// Acquisition/evaluation rounds after the initial design.
    pub iterations: usize,
    /// Latin-hypercube points evaluated before the first GP fit.
    pub initial_points: usize,
    /// Candidates scored by Expected Improvement per round.
    pub candidates: usize,
    /// Share of candidates drawn around the incumbent.
    pub local_fraction: f64,
    /// Std of the incumbent perturbations, in unit-cube coordinates.
    pub local_sd: f64,
    /// Exploration margin for Expected Improvement (in `ln(SSE)` units).
    pub xi: f64,
    /// Relative half-width of the default search box.
    pub span: f64,
    /// Explicit search box; `None` builds one around the initial guess.
    pub bounds: Option<ParameterBounds>,
    /// Stop once the best SSE improves by no more than this for `patience` rounds.
    pub tolerance: Option<f64>,
    pub patience: usize,
    pub seed: u64,
    /// L-BFGS iteration cap for GP hyperparameter fitting, per round.
    pub hyper_max_iters: usize,
    pub noise_floor: f64,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            iterations: 30,
            initial_points: 8,
            candidates: 2048,
            local_fraction: 0.25,
            local_sd: 0.05,
            xi: 0.01,
            span: 0.25,
            bounds: None,
            tolerance: None,
            patience: 5,
            seed: 42,
            hyper_max_iters: 50,
            noise_floor: 1e-5,
        }
    }
}

impl SurrogateConfig {
    pub fn validate(&self) -> Result<(), EosError> {
        if self.candidates == 0 {
            return Err(EosError::InvalidConfig("candidates must be >= 1.".to_string()));
        }
        if !(0.0..=1.0).contains(&self.local_fraction) {
            return Err(EosError::InvalidConfig("local_fraction must be in [0, 1].".to_string()));
        }
        let positive = [
            ("local_sd", self.local_sd),
            ("span", self.span),
            ("noise_floor", self.noise_floor),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(EosError::InvalidConfig(format!("{name} must be finite and > 0.")));
            }
        }
        if !(self.xi.is_finite() && self.xi >= 0.0) {
            return Err(EosError::InvalidConfig("xi must be finite and >= 0.".to_string()));
        }
        if let Some(tol) = self.tolerance {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(EosError::InvalidConfig("tolerance must be finite and >= 0.".to_string()));
            }
            if self.patience == 0 {
                return Err(EosError::InvalidConfig("patience must be >= 1.".to_string()));
            }
        }
        if let Some(b) = &self.bounds {
            ParameterBounds::new(b.lower, b.upper)?;
        }
        Ok(())
    }

    fn hyper_options(&self) -> HyperFitOptions {
        HyperFitOptions {
            max_iters: self.hyper_max_iters,
            noise_floor: self.noise_floor,
        }
    }
}

/// Probabilistic fitter: GP surrogate plus Expected Improvement.
#[derive(Debug, Clone, Default)]
pub struct SurrogateOptimizer {
    config: SurrogateConfig,
}

impl SurrogateOptimizer {
    pub fn new(config: SurrogateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SurrogateConfig {
        &self.config
    }
}

impl ParameterFitter for SurrogateOptimizer {
    fn strategy(&self) -> FitStrategy {
        FitStrategy::Surrogate
    }

    fn fit(
        &self,
        model: ModelKind,
        initial: &ParameterVector,
        samples: &[Sample],
    ) -> Result<FitResult, EosError> {
        self.config.validate()?;
        validate_samples(samples)?;
        let bounds = match &self.config.bounds {
            Some(b) => b.clone(),
            None => ParameterBounds::around(initial, samples, self.config.span)?,
        };
        debug!(
            "surrogate {model} box lower={} upper={}",
            bounds.lower, bounds.upper
        );

        let mut run = Run {
            config: &self.config,
            model,
            samples,
            bounds,
            rng: StdRng::seed_from_u64(self.config.seed),
            observations: Vec::new(),
            evaluations: 0,
            rejected: 0,
            lifecycle: FitLifecycle::new(),
        };
        run.execute(initial)
    }
}

#[derive(Debug, Clone)]
struct Observation {
    unit: Vec<f64>,
    params: ParameterVector,
    sse: f64,
}

struct Run<'a> {
    config: &'a SurrogateConfig,
    model: ModelKind,
    samples: &'a [Sample],
    bounds: ParameterBounds,
    rng: StdRng,
    observations: Vec<Observation>,
    evaluations: usize,
    rejected: usize,
    lifecycle: FitLifecycle,
}

/// Best-so-far trace and stall counter of a run.
#[derive(Debug, Default)]
struct Progress {
    /// Best SSE after the initial design and after every round; infinite
    /// while no evaluated point has been inside the model domain.
    history: Vec<f64>,
    stalled_for: usize,
}

impl Progress {
    fn start(best: Option<f64>, rounds: usize) -> Self {
        let mut history = Vec::with_capacity(rounds + 1);
        history.push(best.unwrap_or(f64::INFINITY));
        Self {
            history,
            stalled_for: 0,
        }
    }

    /// Record the best SSE after a round. With a tolerance, a round counts as
    /// stalled unless it ends with a finite best that beats the previous one
    /// by more than `tol`.
    fn record(&mut self, best: Option<f64>, tolerance: Option<f64>) {
        let previous = self.history.last().copied().unwrap_or(f64::INFINITY);
        let current = best.unwrap_or(f64::INFINITY);
        self.history.push(current);
        if let Some(tol) = tolerance {
            let improved = current.is_finite() && (previous.is_infinite() || previous - current > tol);
            self.stalled_for = if improved { 0 } else { self.stalled_for + 1 };
        }
    }
}

impl Run<'_> {
    fn execute(&mut self, initial: &ParameterVector) -> Result<FitResult, EosError> {
        self.lifecycle.advance(FitState::Fitting);
        let mut design = vec![self.bounds.to_unit(initial)];
        design.extend(latin_hypercube(self.config.initial_points, DIM, &mut self.rng));
        for unit in design {
            self.observe(unit)?;
        }

        let mut progress = Progress::start(self.best().map(|o| o.sse), self.config.iterations);

        let mut hyper = GpHyperparameters::initial(DIM, self.config.noise_floor);
        let mut stop_reason = StopReason::Budget;
        let mut iterations = 0;

        while iterations < self.config.iterations {
            iterations += 1;
            let unit = match self.propose(&mut hyper) {
                Some(u) => u,
                None => {
                    debug!("surrogate {}: no GP proposal, sampling at random", self.model);
                    uniform_point(DIM, &mut self.rng)
                }
            };
            self.observe(unit)?;

            let best = self.best().map(|o| o.sse);
            progress.record(best, self.config.tolerance);
            debug!(
                "surrogate {} iter={iterations} best_sse={:.6e}",
                self.model,
                best.unwrap_or(f64::INFINITY)
            );

            if self.config.tolerance.is_some() && progress.stalled_for >= self.config.patience {
                stop_reason = StopReason::Stalled;
                break;
            }
        }

        if self.rejected > 0 {
            info!(
                "surrogate {}: {} of {} evaluations were outside the model domain",
                self.model, self.rejected, self.evaluations
            );
        }

        let Some(best) = self.best().cloned() else {
            let last_iterate = self.bounds.from_unit(&self.bounds.to_unit(initial));
            let reason = FailureReason::InvalidDomain;
            self.lifecycle.advance(FitState::Failed { last_iterate, reason });
            debug!("surrogate {} states: {:?}", self.model, self.lifecycle.history());
            return Err(EosError::Fit(FitFailure {
                strategy: FitStrategy::Surrogate,
                model: self.model,
                reason,
                last_iterate,
                iterations,
            }));
        };

        info!(
            "surrogate {} finished ({stop_reason}) after {iterations} iterations: {} sse={:.6e}",
            self.model, best.params, best.sse
        );
        let resid = residuals(self.model, &best.params, self.samples)?;
        self.lifecycle.advance(FitState::Converged { params: best.params });
        let lifecycle = std::mem::take(&mut self.lifecycle);
        Ok(FitResult {
            model: self.model,
            strategy: FitStrategy::Surrogate,
            params: best.params,
            state: lifecycle.state(),
            quality: FitQuality::from_sse(best.sse, self.samples.len(), self.model.param_count()),
            diagnostics: FitDiagnostics {
                iterations,
                evaluations: self.evaluations,
                stop_reason: Some(stop_reason),
                residuals: resid,
                covariance: None,
                std_errors: None,
                best_history: progress.history,
                transitions: lifecycle.into_history(),
            },
        })
    }

    /// Evaluate the SSE at a unit-cube point and keep it if it is defined.
    fn observe(&mut self, unit: Vec<f64>) -> Result<(), EosError> {
        let params = self.bounds.from_unit(&unit);
        self.evaluations += 1;
        match sse(self.model, &params, self.samples) {
            Ok(value) if value.is_finite() => {
                self.observations.push(Observation { unit, params, sse: value });
                Ok(())
            }
            Ok(_) | Err(EosError::Domain { .. }) => {
                warn!("surrogate {}: skipping {params}, model undefined", self.model);
                self.rejected += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Lowest SSE so far; ties keep the earliest observation.
    fn best(&self) -> Option<&Observation> {
        let mut best: Option<&Observation> = None;
        for o in &self.observations {
            if best.is_none_or(|b| o.sse < b.sse) {
                best = Some(o);
            }
        }
        best
    }

    /// Fit the GP and return the candidate with the highest Expected Improvement.
    fn propose(&mut self, hyper: &mut GpHyperparameters) -> Option<Vec<f64>> {
        if self.observations.len() < 2 {
            return None;
        }
        let x: Vec<Vec<f64>> = self.observations.iter().map(|o| o.unit.clone()).collect();
        let y: Vec<f64> = self
            .observations
            .iter()
            .map(|o| o.sse.max(f64::MIN_POSITIVE).ln())
            .collect();

        *hyper = optimize_hyperparameters(&x, &y, hyper.clone(), &self.config.hyper_options());
        let gp = GaussianProcess::fit(&x, &y, hyper.clone())?;
        let y_best = y.iter().copied().fold(f64::INFINITY, f64::min);
        let incumbent = self.best()?.unit.clone();

        let candidates = self.candidate_set(&incumbent);
        let xi = self.config.xi;
        let scored: Vec<(usize, f64)> = candidates
            .par_iter()
            .enumerate()
            .filter_map(|(idx, c)| {
                let (mean, sd) = gp.predict(c);
                let ei = expected_improvement(mean, sd, y_best, xi);
                ei.is_finite().then_some((idx, ei))
            })
            .collect();

        // Deterministic selection: highest EI, ties broken by candidate index.
        let (first, rest) = scored.split_first()?;
        let mut best = first;
        for c in rest {
            if c.1 > best.1 || (c.1 == best.1 && c.0 < best.0) {
                best = c;
            }
        }
        debug!(
            "surrogate {}: EI={:.3e} at candidate {}",
            self.model, best.1, best.0
        );
        candidates.into_iter().nth(best.0)
    }

    /// Uniform draws plus Gaussian perturbations of the incumbent.
    fn candidate_set(&mut self, incumbent: &[f64]) -> Vec<Vec<f64>> {
        let n = self.config.candidates;
        let n_local = ((n as f64) * self.config.local_fraction).round() as usize;
        let mut out = Vec::with_capacity(n);

        if let Ok(normal) = Normal::new(0.0, self.config.local_sd) {
            for _ in 0..n_local {
                let c: Vec<f64> = incumbent
                    .iter()
                    .map(|&u| (u + normal.sample(&mut self.rng)).clamp(0.0, 1.0))
                    .collect();
                out.push(c);
            }
        }
        while out.len() < n {
            out.push(uniform_point(DIM, &mut self.rng));
        }
        out
    }
}

/// Expected Improvement for minimization of `f`, given the posterior at a point.
pub fn expected_improvement(mean: f64, sd: f64, best: f64, xi: f64) -> f64 {
    let improvement = best - mean - xi;
    if sd <= 0.0 {
        return improvement.max(0.0);
    }
    let z = improvement / sd;
    let n = StandardNormal::standard();
    improvement * n.cdf(z) + sd * n.pdf(z)
}
