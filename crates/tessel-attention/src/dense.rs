//! Dense reference attention.
//!
//! Attention(Q, K, V) = softmax(Q @ K^T * scale) @ V
//!
//! Materializes the full seq_q × seq_kv score matrix. This is the
//! readable specification of the semantics the flash kernel must
//! reproduce; tests compare the two. For bounded-memory attention, see
//! the `forward` module.

use tessel_core::{Matrix, Result, TesselError};

use crate::config::AttentionConfig;
use crate::forward::validate_inputs;
use crate::mask::AttentionMask;

/// Dense scaled dot-product attention.
///
/// Same mask semantics and edge cases as the flash kernel: masked
/// entries get zero probability, and a fully masked row produces a
/// zero output row instead of NaN.
pub fn dense_attention(
    q: &Matrix,
    k: &Matrix,
    v: &Matrix,
    mask: Option<&AttentionMask>,
    config: &AttentionConfig,
) -> Result<Matrix> {
    let (seq_q, seq_kv, head_dim) = validate_inputs(q, k, v, mask, config)?;
    let scale = config.scale_for(head_dim);
    let d_v = v.cols();

    // scores = Q @ K^T * scale  [seq_q, seq_kv], -inf at masked entries
    let mut scores = vec![0.0f64; seq_q * seq_kv];
    for i in 0..seq_q {
        let q_row = q.row(i);
        for j in 0..seq_kv {
            if let Some(m) = mask {
                if !m.allows(i, j) {
                    scores[i * seq_kv + j] = f64::NEG_INFINITY;
                    continue;
                }
            }
            let k_row = k.row(j);
            let mut dot = 0.0f64;
            for p in 0..head_dim {
                dot += q_row[p] * k_row[p];
            }
            let s = dot * scale;
            if !s.is_finite() {
                return Err(TesselError::NumericalError {
                    context: "dense scores",
                });
            }
            scores[i * seq_kv + j] = s;
        }
    }

    // Row softmax
    for i in 0..seq_q {
        let row = &mut scores[i * seq_kv..(i + 1) * seq_kv];
        let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max_val == f64::NEG_INFINITY {
            row.fill(0.0);
            continue;
        }
        let mut sum = 0.0f64;
        for s in row.iter_mut() {
            *s = (*s - max_val).exp();
            sum += *s;
        }
        if sum <= config.epsilon {
            row.fill(0.0);
            continue;
        }
        let inv = 1.0 / sum;
        for s in row.iter_mut() {
            *s *= inv;
        }
    }

    // output = P @ V  [seq_q, d_v]
    let mut output = Matrix::zeros(seq_q, d_v);
    for i in 0..seq_q {
        let out_row = output.row_mut(i);
        for p in 0..seq_kv {
            let w = scores[i * seq_kv + p];
            if w == 0.0 {
                continue;
            }
            let v_row = v.row(p);
            for j in 0..d_v {
                out_row[j] += w * v_row[j];
            }
        }
    }
    Ok(output)
}
