//! Equation-of-state model implementations.
//!
//! Models are small, pure functions so that fitting/search code can stay
//! generic over the EOS form. [`FittedCurve`] wraps a fitted parameter set as
//! an evaluable curve for plotting and exports.

pub mod curve;
pub mod model;

pub use curve::*;
pub use model::*;
