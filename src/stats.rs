//! Operation result summaries returned by the top-level entry points.

use crate::config::{IdMode, LengthClass, QualityMode};

/// Outcome of a compression run.
#[derive(Clone, Debug, Default)]
pub struct CompressStats {
    pub reads: u64,
    pub bases: u64,
    /// Input size measured as FASTQ text bytes.
    pub bytes_in: u64,
    /// Final archive size on disk.
    pub bytes_out: u64,
    pub blocks: u64,
    /// Compressed bytes per substream, `IDS / SEQ / QUAL / AUX`.
    pub substream_bytes: [u64; 4],
    pub elapsed_ms: u64,
}

impl CompressStats {
    /// Compressed fraction of the input, in percent.
    pub fn ratio_percent(&self) -> f64 {
        self.bytes_out as f64 / self.bytes_in.max(1) as f64 * 100.0
    }
}

/// Outcome of a decompression run.
#[derive(Clone, Debug, Default)]
pub struct DecompressStats {
    pub reads: u64,
    pub bases: u64,
    pub blocks: u64,
    /// Blocks replaced by placeholders under `skip_corrupted`.
    pub corrupted_blocks: Vec<u32>,
    pub elapsed_ms: u64,
}

/// Verification depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyMode {
    /// Footer, index, and global checksum only.
    Quick,
    /// Quick plus a full decode of every block.
    Full,
}

/// Outcome of `verify`.
#[derive(Clone, Debug)]
pub struct VerifyReport {
    pub mode: VerifyMode,
    pub total_blocks: u64,
    pub global_checksum_ok: bool,
    /// Blocks that failed decode or checksum, in ascending order.
    pub failed_blocks: Vec<u32>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.global_checksum_ok && self.failed_blocks.is_empty()
    }
}

/// Outcome of `info`: global header plus index shape, no block decoding.
#[derive(Clone, Debug)]
pub struct ArchiveSummary {
    pub file_len: u64,
    pub total_read_count: u64,
    pub block_count: u64,
    pub length_class: LengthClass,
    pub quality_mode: QualityMode,
    pub id_mode: IdMode,
    pub paired: bool,
    pub preserve_order: bool,
    pub has_reorder_map: bool,
    pub streaming: bool,
    pub original_filename: String,
    pub timestamp: u64,
}
