//! Mathematical utilities: least squares, SPD solves, GP regression, sampling.

pub mod gp;
pub mod linalg;
pub mod ols;
pub mod sampling;

pub use linalg::*;
pub use ols::*;
