//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input samples and the EOS parameter vector (`Sample`, `ParameterVector`)
//! - model/strategy selection enums (`ModelKind`, `ModelSpec`, `FitStrategy`)
//! - the fit lifecycle and outputs (`FitState`, `FitResult`, `CurveFile`, etc.)

pub mod types;

pub use types::*;
