//! Score engine: scaled dot-product score tiles.
//!
//! One tile covers a single (query-block, kv-block) pair. The tile
//! buffer is owned by the caller and reused across iterations; nothing
//! here is retained beyond the current pair.

use tessel_core::{Matrix, Result, TesselError};

use crate::mask::AttentionMask;
use crate::schedule::BlockRange;

/// Fill `tile` with scores for one (query-block, kv-block) pair:
/// `tile[r][c] = (Q[qb.start + r] · K[kb.start + c]) * scale`, stored
/// row-major with stride `kb.len()`.
///
/// Masked entries are set to the -inf sentinel. Any other non-finite
/// score (NaN input slipping past upstream validation, or overflow)
/// is a `NumericalError`.
pub fn score_tile(
    q: &Matrix,
    k: &Matrix,
    scale: f64,
    mask: Option<&AttentionMask>,
    qb: BlockRange,
    kb: BlockRange,
    tile: &mut [f64],
) -> Result<()> {
    let bkv = kb.len();
    debug_assert!(tile.len() >= qb.len() * bkv);

    for (r, g_q) in (qb.start..qb.end).enumerate() {
        let q_row = q.row(g_q);
        for (c, g_k) in (kb.start..kb.end).enumerate() {
            if let Some(m) = mask {
                if !m.allows(g_q, g_k) {
                    tile[r * bkv + c] = f64::NEG_INFINITY;
                    continue;
                }
            }

            let k_row = k.row(g_k);
            let mut dot = 0.0f64;
            for p in 0..q_row.len() {
                dot += q_row[p] * k_row[p];
            }
            let s = dot * scale;
            if !s.is_finite() {
                return Err(TesselError::NumericalError {
                    context: "score tile",
                });
            }
            tile[r * bkv + c] = s;
        }
    }
    Ok(())
}
