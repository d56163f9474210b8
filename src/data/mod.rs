//! Sample datasets: the built-in reference points and synthetic generation.

pub mod sample;

pub use sample::*;
