//! Transient-workspace estimation.
//!
//! The point of the tiled kernel is that its scratch memory is a
//! function of the block sizes, not the sequence lengths. These
//! estimates make that contract checkable.

use serde::Serialize;

use crate::config::AttentionConfig;

const F64_BYTES: usize = std::mem::size_of::<f64>();

/// Transient bytes one query block of the flash kernel needs: the
/// score tile, the block's output accumulator, and its row statistics.
/// Independent of seq_q and seq_kv by construction.
pub fn flash_workspace_bytes(head_dim: usize, config: &AttentionConfig) -> usize {
    let tile = config.block_size_q * config.block_size_kv * F64_BYTES;
    let acc = config.block_size_q * head_dim * F64_BYTES;
    let stats = config.block_size_q * 2 * F64_BYTES;
    tile + acc + stats
}

/// Transient bytes dense attention needs for its score matrix:
/// quadratic in sequence length.
pub fn dense_workspace_bytes(seq_q: usize, seq_kv: usize) -> usize {
    seq_q * seq_kv * F64_BYTES
}

/// Side-by-side comparison of the two estimates for one invocation.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct MemorySavings {
    pub flash_bytes: usize,
    pub dense_bytes: usize,
    /// dense / flash; > 1 means the tiled kernel is cheaper.
    pub ratio: f64,
}

pub fn memory_savings(
    seq_q: usize,
    seq_kv: usize,
    head_dim: usize,
    config: &AttentionConfig,
) -> MemorySavings {
    let flash_bytes = flash_workspace_bytes(head_dim, config);
    let dense_bytes = dense_workspace_bytes(seq_q, seq_kv);
    MemorySavings {
        flash_bytes,
        dense_bytes,
        ratio: dense_bytes as f64 / flash_bytes as f64,
    }
}
