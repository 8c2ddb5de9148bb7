//! Kernel configuration.

use serde::{Deserialize, Serialize};
use tessel_core::{Result, TesselError};

/// Default block size for both axes.
///
/// Chosen so one score tile plus a block's output accumulator fits in
/// L1/L2 cache for typical head dimensions.
pub const DEFAULT_BLOCK_SIZE: usize = 64;

/// Default numerical stability epsilon.
pub const DEFAULT_EPSILON: f64 = 1e-10;

/// Configuration for the flash attention kernels.
///
/// All fields have working defaults; `Default::default()` is a valid
/// configuration for any input shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttentionConfig {
    /// Block size along the query axis (Bq).
    pub block_size_q: usize,
    /// Block size along the key/value axis (Bkv).
    pub block_size_kv: usize,
    /// Multiplicative score scale. `None` selects 1/sqrt(head_dim).
    pub scale: Option<f64>,
    /// Stability epsilon used when finalizing softmax normalizers.
    pub epsilon: f64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            block_size_q: DEFAULT_BLOCK_SIZE,
            block_size_kv: DEFAULT_BLOCK_SIZE,
            scale: None,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl AttentionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both block sizes.
    pub fn with_block_sizes(mut self, block_size_q: usize, block_size_kv: usize) -> Self {
        self.block_size_q = block_size_q;
        self.block_size_kv = block_size_kv;
        self
    }

    /// Override the attention scale (the factor scores are multiplied by).
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Override the stability epsilon.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// The effective scale for a given head dimension.
    pub fn scale_for(&self, head_dim: usize) -> f64 {
        self.scale
            .unwrap_or_else(|| 1.0 / (head_dim as f64).sqrt())
    }

    /// Validate block sizes, scale, and epsilon.
    pub fn validate(&self) -> Result<()> {
        if self.block_size_q == 0 {
            return Err(TesselError::InvalidShape {
                reason: "block_size_q must be at least 1".to_string(),
            });
        }
        if self.block_size_kv == 0 {
            return Err(TesselError::InvalidShape {
                reason: "block_size_kv must be at least 1".to_string(),
            });
        }
        if let Some(s) = self.scale {
            if !(s.is_finite() && s > 0.0) {
                return Err(TesselError::InvalidShape {
                    reason: format!("attention scale must be positive and finite, got {s}"),
                });
            }
        }
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return Err(TesselError::InvalidShape {
                reason: format!("epsilon must be non-negative, got {}", self.epsilon),
            });
        }
        Ok(())
    }
}
