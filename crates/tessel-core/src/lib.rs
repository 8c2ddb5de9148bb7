//! # tessel-core
//!
//! Core numeric types for the Tessel kernels.
//!
//! Provides the foundational `Matrix` type (dense, row-major, f64) and
//! the shared `TesselError` taxonomy. Kernels in sibling crates build on
//! these without any shared mutable state: every kernel invocation owns
//! its matrices and statistics outright.

pub mod error;
pub mod matrix;

pub use error::TesselError;
pub use matrix::Matrix;

pub type Result<T> = std::result::Result<T, TesselError>;
