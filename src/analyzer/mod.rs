//! Global analysis pass.
//!
//! Runs before any block is cut, and only when reordering is enabled: it
//! samples the input to fix the archive's length class, then (for SHORT
//! inputs) computes a similarity permutation over the whole input so that
//! overlapping reads land in the same blocks. When the input exceeds the
//! memory budget it is split into chunks that fit; each chunk reorders
//! independently and archive ids accumulate across chunks, so the reorder
//! map stays globally consistent without ever holding more than one chunk
//! of auxiliary state.

pub mod dict;
pub mod minimizer;
pub mod reorder;

use crate::basepack::seq_to_codes;
use crate::config::{Config, LengthClass, LengthMode};
use crate::display::display_line;
use crate::error::Result;
use crate::fastq::ReadRecord;
use crate::pipeline::StopToken;
use crate::reorder_map::ReorderMap;

// ---------------------------------------------------------------------------
// Length-class sampling
// ---------------------------------------------------------------------------

/// Summary of the sampled read lengths.
#[derive(Clone, Copy, Debug)]
pub struct LengthSample {
    pub max: usize,
    pub median: usize,
}

/// Max and median of a length sample. An empty sample counts as zero-length
/// reads (SHORT).
pub fn sample_lengths(lengths: &[usize]) -> LengthSample {
    if lengths.is_empty() {
        return LengthSample { max: 0, median: 0 };
    }
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable();
    LengthSample {
        max: *sorted.last().unwrap(),
        median: sorted[sorted.len() / 2],
    }
}

/// Apply the config override, or detect from the sample.
pub fn resolve_class(mode: LengthMode, sample: LengthSample) -> LengthClass {
    match mode {
        LengthMode::Short => LengthClass::Short,
        LengthMode::Medium => LengthClass::Medium,
        LengthMode::Long => LengthClass::Long,
        LengthMode::Auto => LengthClass::detect(sample.max, sample.median),
    }
}

// ---------------------------------------------------------------------------
// Whole-input reordering
// ---------------------------------------------------------------------------

/// Result of the analysis pass: records in archive order plus the map back
/// to input order.
pub struct AnalyzerOutcome {
    pub records: Vec<ReadRecord>,
    pub map: ReorderMap,
}

/// Rough per-read memory cost of the reorder pass: the record itself, its
/// 2-bit code copy, and dictionary/bookkeeping overhead.
fn per_read_cost(records: &[ReadRecord]) -> u64 {
    let sample = &records[..records.len().min(1024)];
    let bytes: u64 = sample
        .iter()
        .map(|r| (r.id.len() + 2 * r.seq.len() + r.qual.len()) as u64)
        .sum();
    bytes / sample.len().max(1) as u64 + 96
}

/// Reorder `records` into similarity order, chunking by the memory budget.
pub fn reorder_records(
    records: Vec<ReadRecord>,
    config: &Config,
    stop: &StopToken,
) -> Result<AnalyzerOutcome> {
    let n = records.len();
    if n == 0 {
        return Ok(AnalyzerOutcome {
            records,
            map: ReorderMap::identity(0),
        });
    }

    let chunk_reads = {
        let budget = config.memory_budget_bytes();
        let cost = per_read_cost(&records);
        ((budget / cost).min(n as u64) as usize).max(1)
    };
    if chunk_reads < n {
        display_line(
            3,
            &format!(
                "analyzer: memory budget splits {n} reads into chunks of {chunk_reads}"
            ),
        );
    }

    let threads = config.effective_threads();
    let mut reverse: Vec<u64> = Vec::with_capacity(n);
    let mut slots: Vec<Option<ReadRecord>> = records.into_iter().map(Some).collect();
    let mut permuted: Vec<ReadRecord> = Vec::with_capacity(n);

    let mut offset = 0usize;
    while offset < n {
        let end = (offset + chunk_reads).min(n);
        let codes: Vec<Vec<u8>> = slots[offset..end]
            .iter()
            .map(|r| seq_to_codes(&r.as_ref().unwrap().seq))
            .collect::<Result<_>>()?;
        let order = reorder::greedy_order(&codes, threads, stop)?;
        for &local in &order {
            let original = offset + local as usize;
            reverse.push(original as u64);
            permuted.push(slots[original].take().expect("read moved twice"));
        }
        offset = end;
    }

    let map = ReorderMap::from_reverse(reverse)?;
    Ok(AnalyzerOutcome {
        records: permuted,
        map,
    })
}
