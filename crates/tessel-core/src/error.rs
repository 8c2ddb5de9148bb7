//! Error taxonomy shared across Tessel kernels.

/// Errors raised by Tessel kernels.
///
/// Every variant is raised synchronously at the point of detection, and
/// always before any caller-visible state has been mutated: shape and
/// config validation runs to completion before block processing begins.
#[derive(Debug, thiserror::Error)]
pub enum TesselError {
    /// Mismatched or non-positive dimensions, block sizes, or mask shapes.
    #[error("invalid shape: {reason}")]
    InvalidShape { reason: String },

    /// A non-finite value (other than the -inf mask sentinel) entered the
    /// score computation.
    #[error("numerical error: non-finite value in {context}")]
    NumericalError { context: &'static str },

    /// Backward was called with running statistics whose shape disagrees
    /// with the supplied Q/K/V.
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
}
