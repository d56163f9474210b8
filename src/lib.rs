//! `eos-fit` library crate.
//!
//! Fits energy-volume equations of state (Murnaghan, Birch-Murnaghan, Vinet)
//! to `(volume, energy)` samples, by Levenberg-Marquardt least squares or by
//! Gaussian-process Bayesian optimization, starting from a quadratic pre-fit.
//!
//! The binary (`eos`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitters are reusable from other drivers

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
