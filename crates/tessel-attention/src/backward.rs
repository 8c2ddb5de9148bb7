//! Backward pass: gradient recomputation.
//!
//! No probability or score matrix survives the forward pass. Backward
//! replays the forward block schedule, rebuilding each score tile from
//! Q and K and each normalized probability tile from the saved per-row
//! (max, log-sum-exp) statistics: `P[r][c] = exp(s − m[r] − l[r])`.
//!
//! The softmax Jacobian product `dS = P ⊙ (dP − D)` needs the full-row
//! dot `D[r] = Σ_c P[r][c] · dP[r][c]`, so each query block makes two
//! sweeps over the kv blocks: sweep A accumulates D across all blocks,
//! sweep B consumes the completed D and accumulates dQ, dK, dV. The
//! score tiles are recomputed in both sweeps; nothing is cached.

use tessel_core::{Matrix, Result, TesselError};

use crate::config::AttentionConfig;
use crate::forward::validate_inputs;
use crate::mask::AttentionMask;
use crate::schedule::BlockSchedule;
use crate::score::score_tile;
use crate::softmax::RunningStats;

/// Gradients with respect to the three attention inputs.
#[derive(Clone, Debug)]
pub struct Gradients {
    /// [seq_q, head_dim]
    pub dq: Matrix,
    /// [seq_kv, head_dim]
    pub dk: Matrix,
    /// [seq_kv, d_v]
    pub dv: Matrix,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// Gradients of scaled dot-product attention via recomputation.
///
/// # Arguments
/// * `d_output` - [seq_q, d_v] gradient of the loss w.r.t. the output
/// * `q`, `k`, `v` - the original forward inputs
/// * `stats`    - per-row statistics saved by `forward`
/// * `mask`, `config` - must match the forward call
///
/// Masked entries contribute exactly zero gradient; rows whose saved
/// statistics are -inf (fully masked rows) contribute zero gradient.
pub fn backward(
    d_output: &Matrix,
    q: &Matrix,
    k: &Matrix,
    v: &Matrix,
    stats: &RunningStats,
    mask: Option<&AttentionMask>,
    config: &AttentionConfig,
) -> Result<Gradients> {
    let (seq_q, seq_kv, head_dim) = validate_inputs(q, k, v, mask, config)?;
    let d_v = v.cols();

    if d_output.rows() != seq_q || d_output.cols() != d_v {
        return Err(TesselError::InvalidShape {
            reason: format!(
                "d_output is {}x{} but the forward output was {}x{}",
                d_output.rows(),
                d_output.cols(),
                seq_q,
                d_v
            ),
        });
    }
    if !d_output.is_finite() {
        return Err(TesselError::NumericalError {
            context: "output gradient",
        });
    }
    if stats.len() != seq_q {
        return Err(TesselError::InvalidState {
            reason: format!(
                "running stats cover {} rows but Q has {}",
                stats.len(),
                seq_q
            ),
        });
    }

    let schedule = BlockSchedule::new(seq_q, seq_kv, config)?;
    let scale = config.scale_for(head_dim);

    tracing::debug!(
        seq_q,
        seq_kv,
        head_dim,
        q_blocks = schedule.q_blocks.len(),
        kv_blocks = schedule.kv_blocks.len(),
        "flash attention backward"
    );

    let mut dq = Matrix::zeros(seq_q, head_dim);
    let mut dk = Matrix::zeros(seq_kv, head_dim);
    let mut dv = Matrix::zeros(seq_kv, d_v);

    let mut tile = vec![0.0f64; config.block_size_q * config.block_size_kv];

    for qb in &schedule.q_blocks {
        let bq = qb.len();

        // Sweep A: D[r] = Σ_c P[r][c] * dP[r][c] over the whole row.
        let mut d_dot = vec![0.0f64; bq];
        for kb in &schedule.kv_blocks {
            score_tile(q, k, scale, mask, *qb, *kb, &mut tile)?;
            let bkv = kb.len();
            for r in 0..bq {
                let g_q = qb.start + r;
                let l = stats.log_sum_exp(g_q);
                if !l.is_finite() {
                    continue;
                }
                let m = stats.max_score(g_q);
                let go_row = d_output.row(g_q);
                for c in 0..bkv {
                    let s = tile[r * bkv + c];
                    if s == f64::NEG_INFINITY {
                        continue;
                    }
                    let p = (s - m - l).exp();
                    let dp = dot(go_row, v.row(kb.start + c));
                    d_dot[r] += p * dp;
                }
            }
        }

        // Sweep B: dS = P * (dP - D); dQ += dS @ K * scale,
        // dK += dS^T @ Q * scale, dV += P^T @ dO.
        for kb in &schedule.kv_blocks {
            score_tile(q, k, scale, mask, *qb, *kb, &mut tile)?;
            let bkv = kb.len();
            for r in 0..bq {
                let g_q = qb.start + r;
                let l = stats.log_sum_exp(g_q);
                if !l.is_finite() {
                    continue;
                }
                let m = stats.max_score(g_q);
                let go_row = d_output.row(g_q);
                for c in 0..bkv {
                    let s = tile[r * bkv + c];
                    if s == f64::NEG_INFINITY {
                        continue;
                    }
                    let g_k = kb.start + c;
                    let p = (s - m - l).exp();

                    for (dst, &g) in dv.row_mut(g_k).iter_mut().zip(go_row.iter()) {
                        *dst += p * g;
                    }

                    let dp = dot(go_row, v.row(g_k));
                    let ds = p * (dp - d_dot[r]) * scale;

                    for (dst, &kk) in dq.row_mut(g_q).iter_mut().zip(k.row(g_k).iter()) {
                        *dst += ds * kk;
                    }
                    for (dst, &qq) in dk.row_mut(g_k).iter_mut().zip(q.row(g_q).iter()) {
                        *dst += ds * qq;
                    }
                }
            }
        }
    }

    Ok(Gradients { dq, dk, dv })
}
