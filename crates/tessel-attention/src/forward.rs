//! Flash attention forward pass.
//!
//! Outer loop over query blocks, inner sequential fold over kv blocks.
//! Query blocks are independent (each owns its statistics and output
//! accumulator), so above a row-count threshold they run on rayon.

use std::time::{Duration, Instant};

use rayon::prelude::*;

use tessel_core::{Matrix, Result, TesselError};

use crate::config::AttentionConfig;
use crate::mask::AttentionMask;
use crate::schedule::{BlockRange, BlockSchedule};
use crate::score::score_tile;
use crate::softmax::{fold_block_row, finalize_row, RowStats, RunningStats};

/// Minimum query rows before forward uses rayon parallelism.
const PAR_ROW_THRESHOLD: usize = 64;

/// Per-invocation profile, returned as a value rather than kept as
/// ambient mutable counters so the kernel stays referentially
/// transparent.
#[derive(Clone, Debug)]
pub struct KernelProfile {
    /// Wall time for the whole call, validation included.
    pub elapsed: Duration,
    /// Number of query-axis blocks.
    pub q_blocks: usize,
    /// Number of key/value-axis blocks.
    pub kv_blocks: usize,
    /// Bytes of one transient score tile (Bq × Bkv × 8).
    pub score_tile_bytes: usize,
}

/// Forward result: output matrix plus the frozen per-row statistics.
///
/// `stats` must be retained by the caller if a backward pass will later
/// be requested for the same activations; nothing else crosses the
/// forward/backward boundary.
#[derive(Clone, Debug)]
pub struct AttentionResult {
    pub output: Matrix,
    pub stats: RunningStats,
    pub profile: KernelProfile,
}

/// Validate shapes, config, mask, and input finiteness. Returns
/// (seq_q, seq_kv, head_dim). Shared by forward, backward, and the
/// dense baseline; runs to completion before any block processing.
pub(crate) fn validate_inputs(
    q: &Matrix,
    k: &Matrix,
    v: &Matrix,
    mask: Option<&AttentionMask>,
    config: &AttentionConfig,
) -> Result<(usize, usize, usize)> {
    config.validate()?;

    let seq_q = q.rows();
    let head_dim = q.cols();
    let seq_kv = k.rows();

    if seq_q == 0 || seq_kv == 0 || head_dim == 0 {
        return Err(TesselError::InvalidShape {
            reason: format!(
                "attention input must be non-empty: Q is {}x{}, K is {}x{}",
                seq_q,
                head_dim,
                seq_kv,
                k.cols()
            ),
        });
    }
    if k.cols() != head_dim {
        return Err(TesselError::InvalidShape {
            reason: format!(
                "Q and K disagree on head_dim: {} vs {}",
                head_dim,
                k.cols()
            ),
        });
    }
    if v.rows() != seq_kv {
        return Err(TesselError::InvalidShape {
            reason: format!("K and V disagree on seq_kv: {} vs {}", seq_kv, v.rows()),
        });
    }
    if v.cols() == 0 {
        return Err(TesselError::InvalidShape {
            reason: "V must have at least one column".to_string(),
        });
    }
    if let Some(m) = mask {
        m.validate(seq_q, seq_kv)?;
    }

    for (name, mat) in [("query", q), ("key", k), ("value", v)] {
        if !mat.is_finite() {
            return Err(TesselError::NumericalError { context: name });
        }
    }

    Ok((seq_q, seq_kv, head_dim))
}

struct QBlockResult {
    block: BlockRange,
    /// Finalized output rows, bq × d_v, row-major.
    rows: Vec<f64>,
    stats: Vec<RowStats>,
}

fn process_q_block(
    q: &Matrix,
    k: &Matrix,
    v: &Matrix,
    mask: Option<&AttentionMask>,
    scale: f64,
    epsilon: f64,
    kv_blocks: &[BlockRange],
    block_size_kv: usize,
    qb: BlockRange,
) -> Result<QBlockResult> {
    let bq = qb.len();
    let d_v = v.cols();

    // Transient workspace for this block only; freed when the block ends.
    let mut tile = vec![0.0f64; bq * block_size_kv];
    let mut acc = vec![0.0f64; bq * d_v];
    let mut states = vec![RowStats::empty(); bq];

    for kb in kv_blocks {
        score_tile(q, k, scale, mask, qb, *kb, &mut tile)?;
        let bkv = kb.len();
        for r in 0..bq {
            fold_block_row(
                &mut states[r],
                &mut acc[r * d_v..(r + 1) * d_v],
                &tile[r * bkv..(r + 1) * bkv],
                v,
                kb.start,
            );
        }
    }

    for r in 0..bq {
        finalize_row(&states[r], &mut acc[r * d_v..(r + 1) * d_v], epsilon);
    }

    Ok(QBlockResult {
        block: qb,
        rows: acc,
        stats: states,
    })
}

/// Memory-efficient scaled dot-product attention.
///
/// Computes softmax(Q @ K^T * scale) @ V without materializing the
/// seq_q × seq_kv score matrix: transient storage is bounded by the
/// configured block sizes, not the sequence lengths.
///
/// # Arguments
/// * `q`      - [seq_q, head_dim]
/// * `k`      - [seq_kv, head_dim]
/// * `v`      - [seq_kv, d_v]
/// * `mask`   - optional causal tag or explicit boolean mask
/// * `config` - block sizes, scale override, epsilon
///
/// # Returns
/// Output [seq_q, d_v], the per-row softmax statistics needed by
/// `backward`, and a profile of the invocation.
pub fn forward(
    q: &Matrix,
    k: &Matrix,
    v: &Matrix,
    mask: Option<&AttentionMask>,
    config: &AttentionConfig,
) -> Result<AttentionResult> {
    let started = Instant::now();
    let (seq_q, seq_kv, head_dim) = validate_inputs(q, k, v, mask, config)?;
    let schedule = BlockSchedule::new(seq_q, seq_kv, config)?;
    let scale = config.scale_for(head_dim);

    tracing::debug!(
        seq_q,
        seq_kv,
        head_dim,
        q_blocks = schedule.q_blocks.len(),
        kv_blocks = schedule.kv_blocks.len(),
        "flash attention forward"
    );

    let run = |qb: &BlockRange| {
        process_q_block(
            q,
            k,
            v,
            mask,
            scale,
            config.epsilon,
            &schedule.kv_blocks,
            config.block_size_kv,
            *qb,
        )
    };

    let block_results: Vec<QBlockResult> = if seq_q >= PAR_ROW_THRESHOLD {
        schedule
            .q_blocks
            .par_iter()
            .map(run)
            .collect::<Result<Vec<_>>>()?
    } else {
        schedule
            .q_blocks
            .iter()
            .map(run)
            .collect::<Result<Vec<_>>>()?
    };

    let d_v = v.cols();
    let mut output = Matrix::zeros(seq_q, d_v);
    let mut stats = RunningStats::with_len(seq_q);
    for br in &block_results {
        for (r, row_stats) in br.stats.iter().enumerate() {
            let g_q = br.block.start + r;
            output
                .row_mut(g_q)
                .copy_from_slice(&br.rows[r * d_v..(r + 1) * d_v]);
            stats.set_row(g_q, *row_stats);
        }
    }

    let profile = KernelProfile {
        elapsed: started.elapsed(),
        q_blocks: schedule.q_blocks.len(),
        kv_blocks: schedule.kv_blocks.len(),
        score_tile_bytes: config.block_size_q * config.block_size_kv * std::mem::size_of::<f64>(),
    };
    tracing::trace!(
        elapsed_us = profile.elapsed.as_micros() as u64,
        "flash attention forward done"
    );

    Ok(AttentionResult {
        output,
        stats,
        profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::dense_attention;
    use crate::mask::BoolMask;

    fn arange_matrix(rows: usize, cols: usize) -> Matrix {
        let data: Vec<f64> = (0..rows * cols)
            .map(|i| ((i * 7 + 3) % 13) as f64 * 0.1 - 0.6)
            .collect();
        Matrix::from_vec(data, rows, cols)
    }

    #[test]
    fn test_matches_dense_unmasked() {
        let q = arange_matrix(6, 3);
        let k = arange_matrix(5, 3);
        let v = arange_matrix(5, 3);
        let cfg = AttentionConfig::new().with_block_sizes(2, 2);

        let flash = forward(&q, &k, &v, None, &cfg).unwrap();
        let dense = dense_attention(&q, &k, &v, None, &cfg).unwrap();
        assert!(flash.output.max_abs_diff(&dense) < 1e-12);
    }

    #[test]
    fn test_matches_dense_causal() {
        let q = arange_matrix(8, 4);
        let cfg = AttentionConfig::new().with_block_sizes(3, 3);

        let flash = forward(&q, &q, &q, Some(&AttentionMask::Causal), &cfg).unwrap();
        let dense = dense_attention(&q, &q, &q, Some(&AttentionMask::Causal), &cfg).unwrap();
        assert!(flash.output.max_abs_diff(&dense) < 1e-12);
    }

    #[test]
    fn test_sequence_longer_than_default_block() {
        let seq = 64 + 32;
        let q = arange_matrix(seq, 4);
        let flash = forward(&q, &q, &q, None, &AttentionConfig::default()).unwrap();
        assert_eq!(flash.output.rows(), seq);
        assert!(flash.output.is_finite());
        assert_eq!(flash.profile.q_blocks, 2);
        assert_eq!(flash.profile.kv_blocks, 2);
    }

    #[test]
    fn test_stats_frozen_and_sized() {
        let q = arange_matrix(5, 2);
        let res = forward(&q, &q, &q, None, &AttentionConfig::default()).unwrap();
        assert_eq!(res.stats.len(), 5);
        for r in 0..5 {
            assert!(res.stats.max_score(r).is_finite());
            assert!(res.stats.log_sum_exp(r).is_finite());
        }
    }

    #[test]
    fn test_all_masked_row_is_zero() {
        let q = arange_matrix(3, 2);
        let mut m = BoolMask::full(3, 3);
        for kk in 0..3 {
            m.set(1, kk, false);
        }
        let res = forward(&q, &q, &q, Some(&AttentionMask::Explicit(m)), &AttentionConfig::default())
            .unwrap();
        assert!(res.output.is_finite());
        assert_eq!(res.output.row(1), &[0.0, 0.0]);
        assert_eq!(res.stats.log_sum_exp(1), f64::NEG_INFINITY);
    }

    #[test]
    fn test_shape_errors() {
        let q = Matrix::zeros(4, 3);
        let k = Matrix::zeros(5, 2); // head_dim mismatch
        let v = Matrix::zeros(5, 3);
        assert!(matches!(
            forward(&q, &k, &v, None, &AttentionConfig::default()),
            Err(TesselError::InvalidShape { .. })
        ));

        let k = Matrix::zeros(5, 3);
        let v = Matrix::zeros(4, 3); // seq_kv mismatch
        assert!(matches!(
            forward(&q, &k, &v, None, &AttentionConfig::default()),
            Err(TesselError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_nan_input_is_numerical_error() {
        let mut q = Matrix::zeros(2, 2);
        *q.get_mut(0, 0) = f64::NAN;
        let k = Matrix::zeros(2, 2);
        let v = Matrix::zeros(2, 2);
        assert!(matches!(
            forward(&q, &k, &v, None, &AttentionConfig::default()),
            Err(TesselError::NumericalError { context: "query" })
        ));
    }
}
