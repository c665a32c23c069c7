//! Block assembly: one independently-decodable unit of the archive.
//!
//! A block owns four substreams in fixed order (IDS, SEQ, QUAL, AUX),
//! each behind its own codec tag. The block checksum is computed over the
//! *uncompressed logical* bytes (ids with newline separators, raw bases,
//! raw qualities, lengths as integers) in that same order, so writer and
//! reader agree regardless of which codecs produced the physical bytes.
//! Streams in a discard mode contribute nothing on either side.

pub mod compress;
pub mod decompress;

pub use compress::{compress_block, CompressedBlock};
pub use decompress::{decompress_block, placeholder_records};

use crate::config::{Config, IdMode, LengthClass, QualityMode};
use crate::xxhash::{Xxh64State, CHECKSUM_SEED};

/// Immutable per-archive parameters the block codec needs; built once and
/// shared read-only across workers.
#[derive(Clone, Debug)]
pub struct BlockContext {
    pub class: LengthClass,
    pub quality_mode: QualityMode,
    pub id_mode: IdMode,
    pub quality_context_order: u8,
    pub quality_position_bins: u16,
    pub quality_zstd_wrap: bool,
    pub overlap_long_reads: bool,
    pub id_match_threshold: f64,
    pub zstd_level: i32,
    pub paired: bool,
}

impl BlockContext {
    pub fn new(config: &Config, class: LengthClass) -> Self {
        BlockContext {
            class,
            quality_mode: config.quality_mode,
            id_mode: config.id_mode,
            quality_context_order: config.quality_context_order,
            quality_position_bins: config.quality_position_bins,
            quality_zstd_wrap: config.quality_zstd_wrap,
            overlap_long_reads: config.overlap_long_reads,
            id_match_threshold: config.id_match_threshold,
            zstd_level: config.zstd_level,
            paired: config.paired,
        }
    }
}

/// Checksum over the logical streams. `ids`/`quals` are `None` exactly
/// when the corresponding mode is a discard; both sides derive that from
/// the same global header, so they always agree on what is hashed.
pub fn logical_checksum(
    ids: Option<&[Vec<u8>]>,
    seqs: &[Vec<u8>],
    quals: Option<&[Vec<u8>]>,
    lengths: &[u32],
) -> u64 {
    let mut hash = Xxh64State::new(CHECKSUM_SEED);
    if let Some(ids) = ids {
        for id in ids {
            hash.update(id);
            hash.update(b"\n");
        }
    }
    for seq in seqs {
        hash.update(seq);
    }
    if let Some(quals) = quals {
        for qual in quals {
            hash.update(qual);
        }
    }
    for &len in lengths {
        hash.update(&len.to_le_bytes());
    }
    hash.digest()
}
