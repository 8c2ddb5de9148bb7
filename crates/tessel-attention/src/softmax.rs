//! Online softmax: running (max, log-sum-exp) statistics per query row.
//!
//! The statistics convention is `l = ln Σ exp(s − m)` with `m` the
//! running max, so that after the last kv block the true output is
//! `accumulator / exp(l)` and the backward pass reconstructs the
//! normalized probability as `exp(s − m) / exp(l)`. The absolute
//! log-sum-exp of a row is `m + l`.

use tessel_core::Matrix;

/// One row's running statistics: max score and max-shifted log-sum-exp.
///
/// Starts at (-inf, -inf); a row that never sees an unmasked score
/// stays there and finalizes to a zero output row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowStats {
    pub max: f64,
    pub logsumexp: f64,
}

impl RowStats {
    /// Statistics before any block has been folded in.
    pub fn empty() -> Self {
        Self {
            max: f64::NEG_INFINITY,
            logsumexp: f64::NEG_INFINITY,
        }
    }

    /// Whether no probability mass has been observed yet.
    pub fn is_empty(&self) -> bool {
        !self.logsumexp.is_finite()
    }

    /// Statistics of a single raw-score chunk.
    pub fn of_scores(scores: &[f64]) -> Self {
        let m = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if m == f64::NEG_INFINITY {
            return Self::empty();
        }
        let sum: f64 = scores
            .iter()
            .filter(|s| s.is_finite())
            .map(|&s| (s - m).exp())
            .sum();
        Self {
            max: m,
            logsumexp: sum.ln(),
        }
    }

    /// Associative, commutative merge of two partial statistics.
    ///
    /// Equivalent to computing (max, log-sum-exp) over the concatenation
    /// of the score chunks the two sides summarize, which is what lets a
    /// caller replace the sequential kv fold with a pairwise reduction.
    pub fn merge(self, other: Self) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let m = self.max.max(other.max);
        let sum = (self.logsumexp + self.max - m).exp() + (other.logsumexp + other.max - m).exp();
        Self {
            max: m,
            logsumexp: sum.ln(),
        }
    }
}

/// Fold one kv-block's raw scores for a single query row into the
/// running statistics and the row's output accumulator.
///
/// `scores` holds the row's slice of the score tile (length = kv block
/// size, -inf sentinels for masked entries); `acc` is the row's
/// output accumulator; `kv_start` is the block's global key offset.
///
/// A fully masked block leaves both statistics and accumulator
/// untouched: it contributes no probability mass and no output delta.
pub(crate) fn fold_block_row(
    state: &mut RowStats,
    acc: &mut [f64],
    scores: &[f64],
    v: &Matrix,
    kv_start: usize,
) {
    let m_block = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if m_block == f64::NEG_INFINITY {
        return;
    }

    let m_new = state.max.max(m_block);

    // Rescale what we accumulated so far. exp(-inf) = 0 on the first
    // block, which correctly discards the zero-initialized row.
    let correction = if state.max.is_finite() {
        (state.max - m_new).exp()
    } else {
        0.0
    };
    for x in acc.iter_mut() {
        *x *= correction;
    }

    let mut sum_block = 0.0f64;
    for (c, &s) in scores.iter().enumerate() {
        if s == f64::NEG_INFINITY {
            continue;
        }
        let p = (s - m_new).exp();
        sum_block += p;
        let v_row = v.row(kv_start + c);
        for (a, &vv) in acc.iter_mut().zip(v_row.iter()) {
            *a += p * vv;
        }
    }

    state.logsumexp = if state.logsumexp.is_finite() {
        ((state.logsumexp + state.max - m_new).exp() + sum_block).ln()
    } else {
        sum_block.ln()
    };
    state.max = m_new;
}

/// Divide the accumulator by the final normalizer exp(l).
///
/// A row that never attended anything (l = -inf) or whose normalizer
/// underflows below `epsilon` finalizes to zeros rather than NaN.
pub(crate) fn finalize_row(state: &RowStats, acc: &mut [f64], epsilon: f64) {
    if !state.logsumexp.is_finite() {
        acc.fill(0.0);
        return;
    }
    let norm = state.logsumexp.exp();
    if norm <= epsilon {
        acc.fill(0.0);
        return;
    }
    let inv = 1.0 / norm;
    for x in acc.iter_mut() {
        *x *= inv;
    }
}

/// Per-row statistics for every query row, saved by the forward pass.
///
/// Read-only once forward completes; the backward pass consumes them to
/// reconstruct exact attention probabilities without a cached score
/// matrix.
#[derive(Clone, Debug)]
pub struct RunningStats {
    max: Vec<f64>,
    logsumexp: Vec<f64>,
}

impl RunningStats {
    pub(crate) fn with_len(seq_q: usize) -> Self {
        Self {
            max: vec![f64::NEG_INFINITY; seq_q],
            logsumexp: vec![f64::NEG_INFINITY; seq_q],
        }
    }

    /// Assemble statistics from raw per-row arrays. Lengths must agree.
    pub fn from_parts(max: Vec<f64>, logsumexp: Vec<f64>) -> Self {
        assert_eq!(max.len(), logsumexp.len());
        Self { max, logsumexp }
    }

    /// Number of query rows covered.
    pub fn len(&self) -> usize {
        self.max.len()
    }

    pub fn is_empty(&self) -> bool {
        self.max.is_empty()
    }

    /// Final max score of a row.
    pub fn max_score(&self, row: usize) -> f64 {
        self.max[row]
    }

    /// Final max-shifted log-sum-exp of a row.
    pub fn log_sum_exp(&self, row: usize) -> f64 {
        self.logsumexp[row]
    }

    pub(crate) fn set_row(&mut self, row: usize, stats: RowStats) {
        self.max[row] = stats.max;
        self.logsumexp[row] = stats.logsumexp;
    }
}
