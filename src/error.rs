//! Error types.
//!
//! Two layers:
//!
//! - [`EosError`] is the typed error of the fitting core (model evaluation,
//!   initial guess, solvers). Callers can match on it.
//! - [`AppError`] is what the `eos` binary reports: a message plus a process
//!   exit code.

use crate::domain::{FailureReason, FitState, FitStrategy, ModelKind, ParameterVector};

/// Why a model could not be evaluated at a given volume/parameter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DomainViolation {
    #[error("volume must be finite and > 0")]
    NonPositiveVolume,
    #[error("V0 must be finite and > 0")]
    NonPositiveV0,
    #[error("BP must not be 0")]
    ZeroBp,
    #[error("BP must not be 1")]
    UnitBp,
    #[error("parameters must be finite")]
    NonFiniteParameter,
    #[error("model energy is not finite")]
    NonFiniteEnergy,
}

/// A fitter stopped without converging.
///
/// Carries the last accepted iterate so callers can inspect or restart from it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "{strategy} fit of {model} failed after {iterations} iterations ({reason}); last iterate {last_iterate}"
)]
pub struct FitFailure {
    pub strategy: FitStrategy,
    pub model: ModelKind,
    pub reason: FailureReason,
    pub last_iterate: ParameterVector,
    pub iterations: usize,
}

impl FitFailure {
    /// Terminal state corresponding to this failure.
    pub fn state(&self) -> FitState {
        FitState::Failed {
            last_iterate: self.last_iterate,
            reason: self.reason,
        }
    }
}

/// Errors raised by the fitting core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EosError {
    #[error("{model} cannot be evaluated at V={volume} with {params}: {reason}")]
    Domain {
        model: ModelKind,
        volume: f64,
        params: ParameterVector,
        reason: DomainViolation,
    },
    #[error("Insufficient data: need at least {needed} {what}, found {found}.")]
    InsufficientData {
        what: &'static str,
        needed: usize,
        found: usize,
    },
    #[error(transparent)]
    Fit(#[from] FitFailure),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EosError {
    /// Exit code used by the binary when this error reaches the top level.
    pub fn exit_code(&self) -> u8 {
        match self {
            EosError::InvalidInput(_) | EosError::InvalidConfig(_) => 2,
            EosError::InsufficientData { .. } => 3,
            EosError::Domain { .. } | EosError::Fit(_) => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<EosError> for AppError {
    fn from(err: EosError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let insufficient = EosError::InsufficientData {
            what: "distinct volumes",
            needed: 3,
            found: 2,
        };
        assert_eq!(insufficient.exit_code(), 3);
        assert_eq!(EosError::InvalidConfig("x".into()).exit_code(), 2);

        let app: AppError = insufficient.into();
        assert_eq!(app.exit_code(), 3);
        assert!(app.to_string().contains("distinct volumes"));
    }

    #[test]
    fn fit_failure_reports_last_iterate() {
        let last = ParameterVector::new(-1.0, 0.5, 4.0, 10.0);
        let failure = FitFailure {
            strategy: FitStrategy::LeastSquares,
            model: ModelKind::Murnaghan,
            reason: FailureReason::MaxIterations,
            last_iterate: last,
            iterations: 7,
        };
        assert_eq!(
            failure.state(),
            FitState::Failed {
                last_iterate: last,
                reason: FailureReason::MaxIterations
            }
        );
        let msg = EosError::from(failure).to_string();
        assert!(msg.contains("7 iterations"), "{msg}");
        assert!(msg.contains("max iterations"), "{msg}");
    }
}
