//! Block scheduling: partitioning the query and key/value axes into
//! contiguous tiles.
//!
//! The scheduler is a pure function of shape and config. Both the
//! forward and backward passes replay the same schedule, which is what
//! lets backward reconstruct probabilities from the saved statistics.

use tessel_core::{Result, TesselError};

use crate::config::AttentionConfig;

/// A half-open range of rows `[start, end)` along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    pub start: usize,
    pub end: usize,
}

impl BlockRange {
    /// Number of rows in the block.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Partition `len` rows into contiguous blocks of at most `block_size`.
///
/// Blocks are exhaustive, non-overlapping, and ascending; the last
/// block may be shorter than `block_size`.
pub fn partition(len: usize, block_size: usize, axis: &str) -> Result<Vec<BlockRange>> {
    if len == 0 {
        return Err(TesselError::InvalidShape {
            reason: format!("{axis} sequence length must be at least 1"),
        });
    }
    if block_size == 0 {
        return Err(TesselError::InvalidShape {
            reason: format!("{axis} block size must be at least 1"),
        });
    }

    let n_blocks = (len + block_size - 1) / block_size;
    let mut blocks = Vec::with_capacity(n_blocks);
    let mut start = 0;
    while start < len {
        let end = (start + block_size).min(len);
        blocks.push(BlockRange { start, end });
        start = end;
    }
    Ok(blocks)
}

/// The full two-axis schedule for one kernel invocation.
#[derive(Clone, Debug)]
pub struct BlockSchedule {
    pub q_blocks: Vec<BlockRange>,
    pub kv_blocks: Vec<BlockRange>,
}

impl BlockSchedule {
    pub fn new(seq_q: usize, seq_kv: usize, config: &AttentionConfig) -> Result<Self> {
        Ok(Self {
            q_blocks: partition(seq_q, config.block_size_q, "query")?,
            kv_blocks: partition(seq_kv, config.block_size_kv, "key/value")?,
        })
    }
}
