//! Attention masks: causal, sliding window, padding, custom.
//!
//! The kernels consume allow/deny decisions, so masks are boolean
//! (`true` = attend) rather than additive -inf biases; the score engine
//! writes the -inf sentinel itself for denied entries.

use tessel_core::{Result, TesselError};

/// An explicit seq_q × seq_kv boolean mask. `true` means "attend".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoolMask {
    allowed: Vec<bool>,
    rows: usize,
    cols: usize,
}

impl BoolMask {
    /// Create a mask from a flat row-major boolean vector.
    pub fn new(allowed: Vec<bool>, rows: usize, cols: usize) -> Self {
        assert_eq!(
            allowed.len(),
            rows * cols,
            "{}x{} mask requires {} entries, got {}",
            rows,
            cols,
            rows * cols,
            allowed.len()
        );
        Self {
            allowed,
            rows,
            cols,
        }
    }

    /// Full attention: every position visible.
    pub fn full(rows: usize, cols: usize) -> Self {
        Self::new(vec![true; rows * cols], rows, cols)
    }

    /// Causal (lower-triangular) mask: row r attends to columns <= r.
    pub fn causal(seq_len: usize) -> Self {
        let mut allowed = vec![false; seq_len * seq_len];
        for i in 0..seq_len {
            for j in 0..=i {
                allowed[i * seq_len + j] = true;
            }
        }
        Self::new(allowed, seq_len, seq_len)
    }

    /// Sliding window causal mask: each position attends to at most
    /// `window_size` most recent positions (itself included).
    pub fn sliding_window(seq_len: usize, window_size: usize) -> Self {
        let mut allowed = vec![false; seq_len * seq_len];
        for i in 0..seq_len {
            let start = if i >= window_size { i - window_size + 1 } else { 0 };
            for j in start..=i {
                allowed[i * seq_len + j] = true;
            }
        }
        Self::new(allowed, seq_len, seq_len)
    }

    /// Padding mask: keys at positions >= `kv_len` are hidden from every
    /// query row.
    pub fn padding(seq_q: usize, seq_kv: usize, kv_len: usize) -> Self {
        let mut allowed = vec![false; seq_q * seq_kv];
        for i in 0..seq_q {
            for j in 0..kv_len.min(seq_kv) {
                allowed[i * seq_kv + j] = true;
            }
        }
        Self::new(allowed, seq_q, seq_kv)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Whether query row `q` may attend to key column `k`.
    pub fn allows(&self, q: usize, k: usize) -> bool {
        self.allowed[q * self.cols + k]
    }

    /// Set a single entry.
    pub fn set(&mut self, q: usize, k: usize, allowed: bool) {
        self.allowed[q * self.cols + k] = allowed;
    }
}

/// The mask argument accepted by the kernels: either the causal tag or
/// an explicit boolean matrix.
#[derive(Clone, Debug)]
pub enum AttentionMask {
    /// Row r attends to key positions <= r.
    Causal,
    /// Arbitrary boolean mask, `true` = attend.
    Explicit(BoolMask),
}

impl AttentionMask {
    /// Whether global query row `g_q` may attend to global key `g_k`.
    pub fn allows(&self, g_q: usize, g_k: usize) -> bool {
        match self {
            AttentionMask::Causal => g_k <= g_q,
            AttentionMask::Explicit(m) => m.allows(g_q, g_k),
        }
    }

    /// Check the mask against the invocation's shape.
    pub fn validate(&self, seq_q: usize, seq_kv: usize) -> Result<()> {
        match self {
            AttentionMask::Causal => Ok(()),
            AttentionMask::Explicit(m) => {
                if m.rows() != seq_q || m.cols() != seq_kv {
                    Err(TesselError::InvalidShape {
                        reason: format!(
                            "mask is {}x{} but attention is {}x{}",
                            m.rows(),
                            m.cols(),
                            seq_q,
                            seq_kv
                        ),
                    })
                } else {
                    Ok(())
                }
            }
        }
    }
}
