//! Levenberg-Marquardt nonlinear least squares.
//!
//! Residuals are `r = y - f(p)` and `J = dr/dp`. The trust-region iteration is
//! the MINPACK port from the `levenberg-marquardt` crate; this module adapts an
//! EOS model to its [`LeastSquaresProblem`] and maps the termination onto
//! [`StopReason`] / [`FailureReason`].
//!
//! A trial point outside the model's domain reports a penalty residual, so the
//! solver rejects it like a step that raises the SSE and shrinks its trust
//! region. The Jacobian is taken by central finite differences, with a
//! one-sided fallback when a stencil point leaves the domain, so every
//! [`ModelKind`] shares the same solver.

use std::cell::{Cell, RefCell};

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::{debug, info};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use crate::domain::{
    FailureReason, FitDiagnostics, FitLifecycle, FitQuality, FitResult, FitState, FitStrategy,
    ModelKind, ParameterVector, Sample, StopReason,
};
use crate::error::{EosError, FitFailure};
use crate::fit::fitter::{
    ParameterFitter, residual_vector, residuals, to_params, to_vector, validate_samples,
};
use crate::math::spd_inverse;

/// `sqrt(f64::EPSILON)`, the MINPACK default for `ftol` and `xtol`.
pub const DEFAULT_TOL: f64 = 1.49012e-8;

/// Relative finite-difference step, `EPSILON^(1/3)`.
const FD_REL_STEP: f64 = 6.055_454_452_393_343e-6;

/// Residual reported for every sample at a point the model cannot evaluate.
const PENALTY_RESIDUAL: f64 = 1e100;

/// Solver settings for [`LeastSquaresFitter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeastSquaresConfig {
    /// Residual-evaluation budget is `patience * (k + 1)` for `k` parameters.
    pub patience: usize,
    /// Relative SSE reduction (actual and predicted) below which we stop.
    pub ftol: f64,
    /// Relative step length below which we stop.
    pub xtol: f64,
    /// Cosine between residuals and Jacobian columns below which we stop;
    /// `0` disables the check.
    pub gtol: f64,
    /// Initial trust-region radius as a multiple of the scaled parameter norm.
    pub stepbound: f64,
}

impl Default for LeastSquaresConfig {
    fn default() -> Self {
        Self {
            patience: 200,
            ftol: DEFAULT_TOL,
            xtol: DEFAULT_TOL,
            gtol: 0.0,
            stepbound: 100.0,
        }
    }
}

impl LeastSquaresConfig {
    pub fn validate(&self) -> Result<(), EosError> {
        if self.patience == 0 {
            return Err(EosError::InvalidConfig("patience must be >= 1.".to_string()));
        }
        for (name, v) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(EosError::InvalidConfig(format!("{name} must be finite and >= 0.")));
            }
        }
        if !(self.stepbound.is_finite() && self.stepbound > 0.0) {
            return Err(EosError::InvalidConfig("stepbound must be > 0.".to_string()));
        }
        Ok(())
    }
}

/// Deterministic fitter: Levenberg-Marquardt from the initial guess.
#[derive(Debug, Clone, Default)]
pub struct LeastSquaresFitter {
    config: LeastSquaresConfig,
}

impl LeastSquaresFitter {
    pub fn new(config: LeastSquaresConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LeastSquaresConfig {
        &self.config
    }
}

impl ParameterFitter for LeastSquaresFitter {
    fn strategy(&self) -> FitStrategy {
        FitStrategy::LeastSquares
    }

    fn fit(
        &self,
        model: ModelKind,
        initial: &ParameterVector,
        samples: &[Sample],
    ) -> Result<FitResult, EosError> {
        self.config.validate()?;
        validate_samples(samples)?;
        Solver::new(&self.config, model, samples).run(initial)
    }
}

/// One EOS model over a fixed sample set, as seen by the LM driver.
struct EosProblem<'a> {
    model: ModelKind,
    samples: &'a [Sample],
    params: DVector<f64>,
    evaluations: Cell<usize>,
    jacobians: Cell<usize>,
    /// Whether the latest residual evaluation fell outside the domain.
    out_of_domain: Cell<bool>,
    /// First non-domain error; the driver only sees `None`.
    error: RefCell<Option<EosError>>,
}

impl<'a> EosProblem<'a> {
    fn new(model: ModelKind, samples: &'a [Sample], initial: &ParameterVector) -> Self {
        Self {
            model,
            samples,
            params: to_vector(initial),
            evaluations: Cell::new(0),
            jacobians: Cell::new(0),
            out_of_domain: Cell::new(false),
            error: RefCell::new(None),
        }
    }

    fn eval(&self, p: &DVector<f64>) -> Result<DVector<f64>, EosError> {
        self.evaluations.set(self.evaluations.get() + 1);
        residual_vector(self.model, p, self.samples)
    }

    fn record(&self, err: EosError) {
        let mut slot = self.error.borrow_mut();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// `J = dr/dp` by central differences.
    ///
    /// Falls back to a one-sided difference per column when one stencil point
    /// is outside the domain. Returns `None` when both are.
    fn finite_jacobian(&self, p: &DVector<f64>) -> Option<DMatrix<f64>> {
        let base = match self.eval(p) {
            Ok(r) => r,
            Err(EosError::Domain { .. }) => return None,
            Err(e) => {
                self.record(e);
                return None;
            }
        };
        let mut jac = DMatrix::zeros(self.samples.len(), p.len());

        for j in 0..p.len() {
            let h = FD_REL_STEP * p[j].abs().max(1.0);
            let mut hi = p.clone();
            hi[j] += h;
            let mut lo = p.clone();
            lo[j] -= h;

            let column = match (self.eval(&hi), self.eval(&lo)) {
                (Ok(rh), Ok(rl)) => (rh - rl) / (2.0 * h),
                (Ok(rh), Err(EosError::Domain { .. })) => (rh - &base) / h,
                (Err(EosError::Domain { .. }), Ok(rl)) => (&base - rl) / h,
                (Err(EosError::Domain { .. }), Err(EosError::Domain { .. })) => return None,
                (Err(e), _) | (_, Err(e)) => {
                    self.record(e);
                    return None;
                }
            };
            jac.set_column(j, &column);
        }
        Some(jac)
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for EosProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        match self.eval(&self.params) {
            Ok(r) => {
                self.out_of_domain.set(false);
                Some(r)
            }
            Err(EosError::Domain { .. }) => {
                self.out_of_domain.set(true);
                Some(DVector::from_element(self.samples.len(), PENALTY_RESIDUAL))
            }
            Err(e) => {
                self.record(e);
                None
            }
        }
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.jacobians.set(self.jacobians.get() + 1);
        self.finite_jacobian(&self.params)
    }
}

/// How the driver's termination reads in fit terms.
#[derive(Debug, PartialEq)]
enum Outcome {
    Converged(StopReason),
    Failed(FailureReason),
    Rejected(String),
}

fn classify(termination: TerminationReason, last_trial_out_of_domain: bool) -> Outcome {
    match termination {
        TerminationReason::ResidualsZero => Outcome::Converged(StopReason::ZeroResidual),
        TerminationReason::Converged { ftol: true, .. } => Outcome::Converged(StopReason::Ftol),
        TerminationReason::Converged { .. } => Outcome::Converged(StopReason::Xtol),
        TerminationReason::Orthogonal => Outcome::Converged(StopReason::Gtol),
        TerminationReason::LostPatience => Outcome::Failed(FailureReason::MaxIterations),
        TerminationReason::User(_) => Outcome::Failed(FailureReason::InvalidDomain),
        _ if last_trial_out_of_domain => Outcome::Failed(FailureReason::InvalidDomain),
        // Tolerances tighter than machine precision at an optimum.
        TerminationReason::NoImprovementPossible("ftol") => Outcome::Converged(StopReason::Ftol),
        TerminationReason::NoImprovementPossible("gtol") => Outcome::Converged(StopReason::Gtol),
        TerminationReason::NoImprovementPossible(_) | TerminationReason::Numerical(_) => {
            Outcome::Failed(FailureReason::SingularUpdate)
        }
        other => Outcome::Rejected(format!("{other:?}")),
    }
}

struct Solver<'a> {
    config: &'a LeastSquaresConfig,
    model: ModelKind,
    samples: &'a [Sample],
    lifecycle: FitLifecycle,
}

impl<'a> Solver<'a> {
    fn new(config: &'a LeastSquaresConfig, model: ModelKind, samples: &'a [Sample]) -> Self {
        Self {
            config,
            model,
            samples,
            lifecycle: FitLifecycle::new(),
        }
    }

    fn run(mut self, initial: &ParameterVector) -> Result<FitResult, EosError> {
        self.lifecycle.advance(FitState::Fitting);
        match residuals(self.model, initial, self.samples) {
            Ok(r) => debug!(
                "lm {} start p={initial} sse={:.6e}",
                self.model,
                r.iter().map(|v| v * v).sum::<f64>()
            ),
            Err(EosError::Domain { .. }) => {
                return Err(self.failure(FailureReason::InvalidDomain, *initial, 0));
            }
            Err(e) => return Err(e),
        }

        let (problem, report) = LevenbergMarquardt::new()
            .with_ftol(self.config.ftol)
            .with_xtol(self.config.xtol)
            .with_gtol(self.config.gtol)
            .with_stepbound(self.config.stepbound)
            .with_patience(self.config.patience)
            .minimize(EosProblem::new(self.model, self.samples, initial));

        if let Some(err) = problem.error.take() {
            return Err(err);
        }
        let iterations = problem.jacobians.get();
        let p = problem.params();
        debug!(
            "lm {} terminated: {:?} after {} evaluations",
            self.model,
            report.termination,
            problem.evaluations.get()
        );

        let stop_reason = match classify(report.termination, problem.out_of_domain.get()) {
            Outcome::Converged(reason) => reason,
            Outcome::Failed(reason) => {
                if reason == FailureReason::MaxIterations {
                    info!(
                        "lm {} used up patience={} ({} evaluations)",
                        self.model,
                        self.config.patience,
                        problem.evaluations.get()
                    );
                }
                return Err(self.failure(reason, to_params(&p), iterations));
            }
            Outcome::Rejected(why) => {
                return Err(EosError::InvalidInput(format!(
                    "least squares could not start for {}: {why}",
                    self.model
                )));
            }
        };

        let r = match residual_vector(self.model, &p, self.samples) {
            Ok(r) => r,
            Err(EosError::Domain { .. }) => {
                return Err(self.failure(FailureReason::InvalidDomain, to_params(&p), iterations));
            }
            Err(e) => return Err(e),
        };
        let cost = r.norm_squared();
        let params = to_params(&p);
        info!(
            "lm {} converged ({stop_reason}) after {iterations} iterations: {params}",
            self.model
        );

        let n = self.samples.len();
        let k = self.model.param_count();
        let (covariance, std_errors) = self.covariance(&problem, &p, cost);
        let evaluations = problem.evaluations.get();
        self.lifecycle.advance(FitState::Converged { params });
        Ok(FitResult {
            model: self.model,
            strategy: FitStrategy::LeastSquares,
            params,
            state: self.lifecycle.state(),
            quality: FitQuality::from_sse(cost, n, k),
            diagnostics: FitDiagnostics {
                iterations,
                evaluations,
                stop_reason: Some(stop_reason),
                residuals: r.iter().copied().collect(),
                covariance,
                std_errors,
                best_history: Vec::new(),
                transitions: self.lifecycle.into_history(),
            },
        })
    }

    /// `s² (JᵀJ)⁻¹` and its square-root diagonal, where they exist.
    #[allow(clippy::type_complexity)]
    fn covariance(
        &self,
        problem: &EosProblem<'_>,
        p: &DVector<f64>,
        cost: f64,
    ) -> (Option<Vec<Vec<f64>>>, Option<Vec<f64>>) {
        let n = self.samples.len();
        let m = p.len();
        if n <= m {
            return (None, None);
        }
        let Some(jac) = problem.finite_jacobian(p) else {
            return (None, None);
        };
        let Some(inv) = spd_inverse(&jac.tr_mul(&jac)) else {
            debug!("lm {}: JᵀJ is singular, no covariance", self.model);
            return (None, None);
        };
        let s2 = cost / (n - m) as f64;
        let cov = inv * s2;
        let rows: Vec<Vec<f64>> = (0..m).map(|i| cov.row(i).iter().copied().collect()).collect();
        let std_errors = (0..m).map(|i| cov[(i, i)].max(0.0).sqrt()).collect();
        (Some(rows), Some(std_errors))
    }

    fn failure(&mut self, reason: FailureReason, last_iterate: ParameterVector, iterations: usize) -> EosError {
        self.lifecycle.advance(FitState::Failed {
            last_iterate,
            reason,
        });
        debug!("lm {} states: {:?}", self.model, self.lifecycle.history());
        EosError::Fit(FitFailure {
            strategy: FitStrategy::LeastSquares,
            model: self.model,
            reason,
            last_iterate,
            iterations,
        })
    }
}
