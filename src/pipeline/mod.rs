//! Three-stage parallel executor.
//!
//! One reader, N workers, one writer, joined by bounded crossbeam
//! channels, the only suspension points in the pipeline. The writer
//! re-establishes `block_id` order with an ordered pending buffer, whose
//! size the bounded channels cap: at most `queue depth + workers` blocks
//! can be in flight, so a stalled block back-pressures the reader instead
//! of ballooning memory.
//!
//! Cancellation is cooperative: a shared [`StopToken`] checked between
//! batches. On stop every stage drains quickly, the writer session is
//! aborted, and the temp file disappears.

pub mod compress;
pub mod decompress;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::MB;

/// Shared cooperative cancellation flag.
#[derive(Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        StopToken(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Idempotent.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Channel depth honoring the memory budget: the reader may hold at most
/// `budget / est_block_bytes` proto-blocks in flight, clamped to
/// `[1, 2 × workers]`.
pub fn queue_depth(workers: usize, memory_budget: u64, est_block_bytes: u64) -> usize {
    let by_budget = (memory_budget / est_block_bytes.max(1)).min(usize::MAX as u64) as usize;
    by_budget.clamp(1, (workers * 2).max(2))
}

/// Rough proto-block footprint used for queue sizing.
pub fn estimate_block_bytes(reads_per_block: u32, median_len: usize) -> u64 {
    // id + seq + qual + per-record overhead.
    u64::from(reads_per_block) * (2 * median_len as u64 + 64).max(MB as u64 / 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_token_is_shared() {
        let a = StopToken::new();
        let b = a.clone();
        assert!(!b.is_stopped());
        a.stop();
        assert!(b.is_stopped());
    }

    #[test]
    fn queue_depth_clamps_to_budget() {
        // Unlimited budget: twice the workers.
        assert_eq!(queue_depth(4, u64::MAX, 1 << 20), 8);
        // Tight budget: one block in flight, never zero.
        assert_eq!(queue_depth(4, 1 << 20, 1 << 24), 1);
        // Mid-range budget.
        assert_eq!(queue_depth(8, 4 << 20, 1 << 20), 4);
    }
}
