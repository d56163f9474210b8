//! Gaussian-process regression with a squared-exponential ARD kernel.
//!
//! ```text
//! k(a, b) = σf² exp(-½ Σ_d ((a_d - b_d) / ℓ_d)²) + σn² δ(a, b)
//! ```
//!
//! Targets are standardized before fitting; predictions are mapped back.
//! Hyperparameters live in log space and are fitted by L-BFGS (argmin) on the
//! negative log marginal likelihood, projected onto an admissible box.

use argmin::core::{ArgminError, CostFunction, Error, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use log::debug;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::math::linalg::cholesky_with_jitter;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Admissible range for log length scales (inputs live on the unit cube).
const LOG_LENGTH_RANGE: (f64, f64) = (-4.6, 2.3);
const LOG_SIGNAL_RANGE: (f64, f64) = (-4.6, 2.3);
/// Upper bound for the log noise sd, in standardized target units.
const LOG_NOISE_MAX: f64 = 0.0;

/// L-BFGS history length.
const LBFGS_MEMORY: usize = 7;
/// Gradient norm at which the hyperparameter search stops.
const LBFGS_GRAD_TOL: f64 = 1e-6;

type Theta = Vec<f64>;
type HyperLineSearch = MoreThuenteLineSearch<Theta, Theta, f64>;
type HyperSolver = LBFGS<HyperLineSearch, Theta, Theta, f64>;

/// Kernel hyperparameters (all in natural-log space).
#[derive(Debug, Clone, PartialEq)]
pub struct GpHyperparameters {
    pub log_length_scales: Vec<f64>,
    pub log_signal_sd: f64,
    pub log_noise_sd: f64,
}

impl GpHyperparameters {
    /// Starting point for hyperparameter fitting on unit-cube inputs.
    pub fn initial(dim: usize, noise_floor: f64) -> Self {
        Self {
            log_length_scales: vec![0.3_f64.ln(); dim],
            log_signal_sd: 0.0,
            log_noise_sd: 1e-2_f64.max(noise_floor).ln(),
        }
    }

    fn dim(&self) -> usize {
        self.log_length_scales.len()
    }

    /// Flatten to `[log ℓ_1..log ℓ_d, log σf, log σn]`.
    fn to_theta(&self) -> Theta {
        let mut theta = self.log_length_scales.clone();
        theta.push(self.log_signal_sd);
        theta.push(self.log_noise_sd);
        theta
    }

    /// Inverse of [`Self::to_theta`]; `theta` has `dim + 2` entries.
    fn from_theta(theta: &[f64]) -> Self {
        let dim = theta.len().saturating_sub(2);
        Self {
            log_length_scales: theta[..dim].to_vec(),
            log_signal_sd: theta.get(dim).copied().unwrap_or(0.0),
            log_noise_sd: theta.get(dim + 1).copied().unwrap_or(0.0),
        }
    }

    /// Projection onto the admissible box.
    fn clamped(mut self, noise_floor: f64) -> Self {
        for l in &mut self.log_length_scales {
            *l = l.clamp(LOG_LENGTH_RANGE.0, LOG_LENGTH_RANGE.1);
        }
        self.log_signal_sd = self.log_signal_sd.clamp(LOG_SIGNAL_RANGE.0, LOG_SIGNAL_RANGE.1);
        let noise_min = noise_floor.max(f64::MIN_POSITIVE).ln().min(LOG_NOISE_MAX);
        self.log_noise_sd = self.log_noise_sd.clamp(noise_min, LOG_NOISE_MAX);
        self
    }
}

/// Options for [`optimize_hyperparameters`].
#[derive(Debug, Clone, Copy)]
pub struct HyperFitOptions {
    /// L-BFGS iteration cap.
    pub max_iters: usize,
    /// Lower bound on the noise sd (standardized units).
    pub noise_floor: f64,
}

/// A GP conditioned on training data.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    x: Vec<Vec<f64>>,
    y_mean: f64,
    y_scale: f64,
    hyper: GpHyperparameters,
    chol: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    log_marginal_likelihood: f64,
}

impl GaussianProcess {
    /// Condition a GP on `(x, y)` with fixed hyperparameters.
    ///
    /// Returns `None` when there is no data, the shapes disagree, or the kernel
    /// matrix cannot be factorized.
    pub fn fit(x: &[Vec<f64>], y: &[f64], hyper: GpHyperparameters) -> Option<Self> {
        if x.is_empty() || x.len() != y.len() || x.iter().any(|xi| xi.len() != hyper.dim()) {
            return None;
        }
        let (y_std, y_mean, y_scale) = standardize(y);
        let k = kernel_matrix(x, &hyper);
        let (chol, _) = cholesky_with_jitter(&k)?;
        let alpha = chol.solve(&y_std);
        let log_marginal_likelihood = lml_from_factor(&chol, &y_std, &alpha);

        Some(Self {
            x: x.to_vec(),
            y_mean,
            y_scale,
            hyper,
            chol,
            alpha,
            log_marginal_likelihood,
        })
    }

    /// Posterior mean and standard deviation of the latent function at `x`.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let kstar = DVector::from_iterator(
            self.x.len(),
            self.x.iter().map(|xi| latent_kernel(xi, x, &self.hyper)),
        );
        let mean_std = kstar.dot(&self.alpha);
        let prior_var = (2.0 * self.hyper.log_signal_sd).exp();
        let var_std = (prior_var - kstar.dot(&self.chol.solve(&kstar))).max(0.0);

        (self.y_mean + self.y_scale * mean_std, self.y_scale * var_std.sqrt())
    }

    pub fn hyperparameters(&self) -> &GpHyperparameters {
        &self.hyper
    }

    /// Log marginal likelihood of the standardized targets.
    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }
}

/// Negative log marginal likelihood of standardized targets, as an argmin
/// problem over the flattened log hyperparameters.
///
/// Both the cost and the gradient are taken at the projection of `theta` onto
/// the admissible box; gradient entries of clamped coordinates are zero.
struct NegLogMarginal<'a> {
    x: &'a [Vec<f64>],
    y_std: DVector<f64>,
    noise_floor: f64,
}

impl NegLogMarginal<'_> {
    fn project(&self, theta: &[f64]) -> GpHyperparameters {
        GpHyperparameters::from_theta(theta).clamped(self.noise_floor)
    }

    fn evaluate(&self, theta: &[f64]) -> Result<(f64, Vec<f64>), Error> {
        lml_and_gradient(self.x, &self.y_std, &self.project(theta)).ok_or_else(|| {
            ArgminError::ConditionViolated {
                text: "GP kernel matrix is not positive definite".to_string(),
            }
            .into()
        })
    }
}

impl CostFunction for NegLogMarginal<'_> {
    type Param = Theta;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let (lml, _) = self.evaluate(theta)?;
        Ok(-lml)
    }
}

impl Gradient for NegLogMarginal<'_> {
    type Param = Theta;
    type Gradient = Theta;

    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        let (_, grad) = self.evaluate(theta)?;
        let projected = self.project(theta).to_theta();
        Ok(grad
            .iter()
            .zip(theta.iter().zip(&projected))
            .map(|(g, (t, p))| if t == p { -g } else { 0.0 })
            .collect())
    }
}

/// Fit hyperparameters by L-BFGS on the negative log marginal likelihood.
///
/// The returned hyperparameters are never worse than `init` (after clamping);
/// a solver error keeps the starting point.
pub fn optimize_hyperparameters(
    x: &[Vec<f64>],
    y: &[f64],
    init: GpHyperparameters,
    opts: &HyperFitOptions,
) -> GpHyperparameters {
    let start = init.clamped(opts.noise_floor);
    if x.is_empty() || x.len() != y.len() || opts.max_iters == 0 {
        return start;
    }
    let (y_std, _, _) = standardize(y);
    let Some((start_lml, _)) = lml_and_gradient(x, &y_std, &start) else {
        return start;
    };

    let problem = NegLogMarginal {
        x,
        y_std,
        noise_floor: opts.noise_floor,
    };
    match run_lbfgs(problem, start.to_theta(), opts.max_iters) {
        Ok((theta, cost)) if -cost > start_lml => {
            GpHyperparameters::from_theta(&theta).clamped(opts.noise_floor)
        }
        Ok(_) => start,
        Err(e) => {
            debug!("GP hyperparameter search stopped early: {e}");
            start
        }
    }
}

/// Run L-BFGS with a More-Thuente line search; returns the best `(theta, cost)`.
fn run_lbfgs(problem: NegLogMarginal<'_>, theta0: Theta, max_iters: usize) -> Result<(Theta, f64), Error> {
    let linesearch: HyperLineSearch = MoreThuenteLineSearch::new();
    let solver: HyperSolver = LBFGS::new(linesearch, LBFGS_MEMORY).with_tolerance_grad(LBFGS_GRAD_TOL)?;

    let result = Executor::new(problem, solver)
        .configure(|state| state.param(theta0).max_iters(max_iters as u64))
        .run()?;
    let state = result.state();
    let best = state.get_best_param().cloned().ok_or_else(|| {
        Error::from(ArgminError::ConditionViolated {
            text: "L-BFGS finished without a best parameter".to_string(),
        })
    })?;
    Ok((best, state.get_best_cost()))
}

/// Log marginal likelihood and its gradient w.r.t.
/// `[log ℓ_1..log ℓ_d, log σf, log σn]`, for standardized targets.
pub(crate) fn lml_and_gradient(
    x: &[Vec<f64>],
    y_std: &DVector<f64>,
    hyper: &GpHyperparameters,
) -> Option<(f64, Vec<f64>)> {
    let n = x.len();
    let dim = hyper.dim();
    let k = kernel_matrix(x, hyper);
    let (chol, _) = cholesky_with_jitter(&k)?;
    let alpha = chol.solve(y_std);
    let lml = lml_from_factor(&chol, y_std, &alpha);
    if !lml.is_finite() {
        return None;
    }

    // dL/dθ = ½ tr((ααᵀ - K⁻¹) ∂K/∂θ)
    let w = &alpha * alpha.transpose() - chol.inverse();
    let lengths: Vec<f64> = hyper.log_length_scales.iter().map(|l| l.exp()).collect();
    let signal_var = (2.0 * hyper.log_signal_sd).exp();
    let noise_var = (2.0 * hyper.log_noise_sd).exp();

    let mut grad = vec![0.0; dim + 2];
    let mut r2 = vec![0.0; dim];
    for i in 0..n {
        for j in 0..n {
            let mut s = 0.0;
            for d in 0..dim {
                let r = (x[i][d] - x[j][d]) / lengths[d];
                r2[d] = r * r;
                s += r2[d];
            }
            let kf = signal_var * (-0.5 * s).exp();
            let wij = 0.5 * w[(i, j)];
            for d in 0..dim {
                grad[d] += wij * kf * r2[d];
            }
            grad[dim] += wij * 2.0 * kf;
        }
        grad[dim + 1] += 0.5 * w[(i, i)] * 2.0 * noise_var;
    }

    Some((lml, grad))
}

fn lml_from_factor(chol: &Cholesky<f64, Dyn>, y_std: &DVector<f64>, alpha: &DVector<f64>) -> f64 {
    let n = y_std.len() as f64;
    let l = chol.l_dirty();
    let half_log_det: f64 = (0..y_std.len()).map(|i| l[(i, i)].ln()).sum();
    -0.5 * y_std.dot(alpha) - half_log_det - 0.5 * n * LN_2PI
}

fn latent_kernel(a: &[f64], b: &[f64], hyper: &GpHyperparameters) -> f64 {
    let s: f64 = a
        .iter()
        .zip(b)
        .zip(&hyper.log_length_scales)
        .map(|((ai, bi), ll)| {
            let r = (ai - bi) / ll.exp();
            r * r
        })
        .sum();
    (2.0 * hyper.log_signal_sd).exp() * (-0.5 * s).exp()
}

fn kernel_matrix(x: &[Vec<f64>], hyper: &GpHyperparameters) -> DMatrix<f64> {
    let n = x.len();
    let noise_var = (2.0 * hyper.log_noise_sd).exp();
    DMatrix::from_fn(n, n, |i, j| {
        let k = latent_kernel(&x[i], &x[j], hyper);
        if i == j { k + noise_var } else { k }
    })
}

fn standardize(y: &[f64]) -> (DVector<f64>, f64, f64) {
    let n = y.len().max(1) as f64;
    let mean = y.iter().sum::<f64>() / n;
    let var = y.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let scale = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
    let y_std = DVector::from_iterator(y.len(), y.iter().map(|v| (v - mean) / scale));
    (y_std, mean, scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64 / 7.0]).collect();
        let y = x.iter().map(|p| (3.0 * p[0]).sin()).collect();
        (x, y)
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let (x, y) = toy_data();
        let (y_std, _, _) = standardize(&y);
        let hyper = GpHyperparameters {
            log_length_scales: vec![0.4_f64.ln()],
            log_signal_sd: 0.1,
            log_noise_sd: 0.05_f64.ln(),
        };
        let (_, grad) = lml_and_gradient(&x, &y_std, &hyper).unwrap();

        let h = 1e-6;
        let theta = hyper.to_theta();
        for k in 0..3 {
            let mut up = theta.clone();
            up[k] += h;
            let mut down = theta.clone();
            down[k] -= h;
            let lml = |t: &[f64]| {
                lml_and_gradient(&x, &y_std, &GpHyperparameters::from_theta(t))
                    .unwrap()
                    .0
            };
            let fd = (lml(&up) - lml(&down)) / (2.0 * h);
            assert!(
                (fd - grad[k]).abs() < 1e-4 * (1.0 + fd.abs()),
                "component {k}: analytic {} vs fd {fd}",
                grad[k]
            );
        }
    }

    #[test]
    fn optimization_does_not_decrease_likelihood() {
        let (x, y) = toy_data();
        let init = GpHyperparameters::initial(1, 1e-5);
        let opts = HyperFitOptions {
            max_iters: 50,
            noise_floor: 1e-5,
        };
        let before = GaussianProcess::fit(&x, &y, init.clone()).unwrap().log_marginal_likelihood();
        let tuned = optimize_hyperparameters(&x, &y, init, &opts);
        let after = GaussianProcess::fit(&x, &y, tuned).unwrap().log_marginal_likelihood();
        assert!(after >= before, "lml went from {before} to {after}");
    }

    #[test]
    fn tuned_hyperparameters_stay_in_the_admissible_box() {
        let (x, y) = toy_data();
        let init = GpHyperparameters {
            log_length_scales: vec![10.0],
            log_signal_sd: -10.0,
            log_noise_sd: -50.0,
        };
        let opts = HyperFitOptions {
            max_iters: 30,
            noise_floor: 1e-3,
        };
        let tuned = optimize_hyperparameters(&x, &y, init, &opts);
        let l = tuned.log_length_scales[0];
        assert!((LOG_LENGTH_RANGE.0..=LOG_LENGTH_RANGE.1).contains(&l), "log length {l}");
        assert!((LOG_SIGNAL_RANGE.0..=LOG_SIGNAL_RANGE.1).contains(&tuned.log_signal_sd));
        assert!(tuned.log_noise_sd >= 1e-3_f64.ln() - 1e-12 && tuned.log_noise_sd <= LOG_NOISE_MAX);
    }

    #[test]
    fn projected_gradient_is_zero_on_clamped_coordinates() {
        let (x, y) = toy_data();
        let (y_std, _, _) = standardize(&y);
        let problem = NegLogMarginal {
            x: &x,
            y_std,
            noise_floor: 1e-5,
        };
        let theta = vec![50.0, 0.0, 0.01_f64.ln()];
        let grad = problem.gradient(&theta).unwrap();
        assert_eq!(grad[0], 0.0);
        assert!(grad[1] != 0.0);
        let projected = problem.project(&theta);
        assert_eq!(projected.log_length_scales[0], LOG_LENGTH_RANGE.1);
        assert!((problem.cost(&theta).unwrap() - problem.cost(&projected.to_theta()).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn posterior_interpolates_and_is_uncertain_away_from_data() {
        let x = vec![vec![0.1], vec![0.2], vec![0.3]];
        let y = vec![1.0, 2.0, 1.5];
        let hyper = GpHyperparameters {
            log_length_scales: vec![0.1_f64.ln()],
            log_signal_sd: 0.0,
            log_noise_sd: 1e-4_f64.ln(),
        };
        let gp = GaussianProcess::fit(&x, &y, hyper).unwrap();

        let (mean, sd_near) = gp.predict(&[0.2]);
        assert!((mean - 2.0).abs() < 1e-3, "mean at training point: {mean}");
        let (_, sd_far) = gp.predict(&[0.9]);
        assert!(sd_far > 10.0 * sd_near, "sd near {sd_near}, far {sd_far}");
    }
}
