//! EOS fitting.
//!
//! Responsibilities:
//!
//! - quadratic pre-fit for the initial guess
//! - the two [`ParameterFitter`] strategies (Levenberg-Marquardt, GP surrogate)
//! - select the best model using BIC

pub mod fitter;
pub mod guess;
pub mod lm;
pub mod selection;
pub mod surrogate;

pub use fitter::*;
pub use guess::*;
pub use lm::*;
pub use selection::*;
pub use surrogate::*;
