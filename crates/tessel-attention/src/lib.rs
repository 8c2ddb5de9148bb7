//! # tessel-attention
//!
//! Block-tiled ("flash") scaled dot-product attention for Tessel.
//!
//! Provides:
//! - Flash forward pass: O(n) transient memory via online softmax,
//!   never materializing the seq_q × seq_kv score matrix
//! - Backward pass that recomputes attention weights from the saved
//!   per-row (max, log-sum-exp) statistics instead of caching them
//! - Dense reference baseline
//! - Causal, sliding-window, padding, and explicit boolean masks
//! - Transient-workspace memory estimation
//!
//! Reference: Dao et al., "FlashAttention-2: Faster Attention with
//! Better Parallelism and Work Partitioning" (2023).

pub mod backward;
pub mod config;
pub mod dense;
pub mod forward;
pub mod mask;
pub mod memory;
pub mod schedule;
pub mod score;
pub mod softmax;

pub use backward::{backward, Gradients};
pub use config::AttentionConfig;
pub use dense::dense_attention;
pub use forward::{forward, AttentionResult, KernelProfile};
pub use mask::{AttentionMask, BoolMask};
pub use memory::{dense_workspace_bytes, flash_workspace_bytes, memory_savings, MemorySavings};
pub use schedule::{BlockRange, BlockSchedule};
pub use softmax::{RowStats, RunningStats};
