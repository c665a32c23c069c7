//! Engine configuration.
//!
//! [`Config`] is a plain value type owned by the caller; there is no global
//! configuration state. Field defaults follow the archive defaults; call
//! [`Config::validate`] before handing a config to the pipeline so that
//! inconsistent combinations fail with a `Usage` error instead of surfacing
//! deep inside a worker.

use crate::error::{FqcError, Result};

// ---------------------------------------------------------------------------
// Numeric constants
// ---------------------------------------------------------------------------
pub const KB: usize = 1 << 10;
pub const MB: usize = 1 << 20;
pub const GB: usize = 1 << 30;

/// Reads whose sampled maximum length is at or below this are SHORT.
pub const SHORT_MAX_LEN: usize = 511;

/// Sampled median below this (together with `SHORT_MAX_LEN`) selects SHORT.
pub const SHORT_MEDIAN_LEN: usize = 1024;

/// Reads whose sampled maximum length is at or below this are MEDIUM.
pub const MEDIUM_MAX_LEN: usize = 10_240;

/// Default reads per block by length class.
pub const BLOCK_READS_SHORT: u32 = 100_000;
pub const BLOCK_READS_MEDIUM: u32 = 50_000;
pub const BLOCK_READS_LONG: u32 = 10_000;

/// Default cap on total bases per block.
pub const DEFAULT_MAX_BLOCK_BASES: u64 = 256 * MB as u64;

/// Number of records sampled to determine the length class.
pub const CLASS_SAMPLE_READS: usize = 10_000;

// ---------------------------------------------------------------------------
// Mode enums
// ---------------------------------------------------------------------------

/// How quality strings are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QualityMode {
    /// Exact Phred-33 bytes, context-model coded.
    #[default]
    Lossless,
    /// 8-bin Illumina quantization applied before modeling.
    Illumina8,
    /// Model-based quantizer. Parses but is rejected by [`Config::validate`].
    Qvz,
    /// Store nothing; decode synthesizes `'!'` placeholders.
    Discard,
}

impl QualityMode {
    /// Two-bit encoding used in the global header flags (bits 3–4).
    pub fn flag_bits(self) -> u64 {
        match self {
            QualityMode::Lossless => 0,
            QualityMode::Illumina8 => 1,
            QualityMode::Qvz => 2,
            QualityMode::Discard => 3,
        }
    }

    pub fn from_flag_bits(bits: u64) -> Result<Self> {
        match bits {
            0 => Ok(QualityMode::Lossless),
            1 => Ok(QualityMode::Illumina8),
            2 => Ok(QualityMode::Qvz),
            3 => Ok(QualityMode::Discard),
            other => Err(FqcError::format(format!(
                "invalid quality mode bits {other} in header flags"
            ))),
        }
    }
}

/// How read identifiers are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IdMode {
    /// Verbatim, length-prefixed, general-compressed.
    Exact,
    /// Pattern-tokenized with delta-coded integer columns when the ids are
    /// regular enough; falls back to exact framing otherwise.
    #[default]
    Tokenize,
    /// Store nothing; decode synthesizes sequential ids.
    Discard,
}

impl IdMode {
    /// Two-bit encoding used in the global header flags (bits 5–6).
    pub fn flag_bits(self) -> u64 {
        match self {
            IdMode::Exact => 0,
            IdMode::Tokenize => 1,
            IdMode::Discard => 2,
        }
    }

    pub fn from_flag_bits(bits: u64) -> Result<Self> {
        match bits {
            0 => Ok(IdMode::Exact),
            1 => Ok(IdMode::Tokenize),
            2 => Ok(IdMode::Discard),
            other => Err(FqcError::format(format!(
                "invalid id mode bits {other} in header flags"
            ))),
        }
    }
}

/// Length-class override. `Auto` derives the class from an input sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LengthMode {
    #[default]
    Auto,
    Short,
    Medium,
    Long,
}

/// The archive-wide length class. Immutable once the global header is
/// written; governs codec selection and block sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthClass {
    Short,
    Medium,
    Long,
}

impl LengthClass {
    /// Derive the class from a sample's maximum and median read length.
    pub fn detect(max_len: usize, median_len: usize) -> Self {
        if max_len <= SHORT_MAX_LEN && median_len < SHORT_MEDIAN_LEN {
            LengthClass::Short
        } else if max_len <= MEDIUM_MAX_LEN {
            LengthClass::Medium
        } else {
            LengthClass::Long
        }
    }

    /// Default reads-per-block budget for this class.
    pub fn default_block_reads(self) -> u32 {
        match self {
            LengthClass::Short => BLOCK_READS_SHORT,
            LengthClass::Medium => BLOCK_READS_MEDIUM,
            LengthClass::Long => BLOCK_READS_LONG,
        }
    }

    /// Two-bit encoding used in the global header flags (bits 10–11).
    pub fn flag_bits(self) -> u64 {
        match self {
            LengthClass::Short => 0,
            LengthClass::Medium => 1,
            LengthClass::Long => 2,
        }
    }

    /// Inverse of [`LengthClass::flag_bits`].
    pub fn from_flag_bits(bits: u64) -> Result<Self> {
        match bits {
            0 => Ok(LengthClass::Short),
            1 => Ok(LengthClass::Medium),
            2 => Ok(LengthClass::Long),
            other => Err(FqcError::format(format!(
                "invalid length class bits {other} in header flags"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// All tunable parameters for compression.
#[derive(Clone, Debug)]
pub struct Config {
    /// Worker threads. 0 = one per logical core. Default: 0.
    pub threads: usize,
    /// Run the global analysis pass and store reads in similarity order.
    /// Only effective for the SHORT class. Default: true.
    pub reorder: bool,
    /// Keep reads in input order (disables the analyzer and the reorder
    /// map). Default: false.
    pub preserve_order: bool,
    /// Single-pass mode: never buffer the whole input, implies no reorder.
    /// Default: false.
    pub streaming: bool,
    /// Quality storage mode. Default: lossless.
    pub quality_mode: QualityMode,
    /// Identifier storage mode. Default: tokenize.
    pub id_mode: IdMode,
    /// Length-class override. Default: auto.
    pub length_mode: LengthMode,
    /// Reads per block. 0 = class default. Default: 0.
    pub block_reads: u32,
    /// Cap on total bases per block. Default: 256 MiB of bases.
    pub max_block_bases: u64,
    /// Memory budget in MiB for the analyzer's in-memory read store and the
    /// pipeline's in-flight blocks. 0 = unlimited. Default: 0.
    pub memory_limit_mb: usize,
    /// Input is interleaved paired-end. Default: false.
    pub paired: bool,
    /// Quality context order (previous symbols), 0–2. Default: 1.
    pub quality_context_order: u8,
    /// Quality position bins; power of two in 1..=256. Default: 16.
    pub quality_position_bins: u16,
    /// Wrap the arithmetic-coded quality stream in Zstd. Default: true.
    pub quality_zstd_wrap: bool,
    /// Opt-in: encode LONG reads with the overlap codec instead of plain
    /// Zstd. Default: false.
    pub overlap_long_reads: bool,
    /// Minimum fraction of ids that must match the detected pattern for
    /// tokenize mode to engage. Default: 0.8.
    pub id_match_threshold: f64,
    /// Zstd level for the general-compressor substreams. Default: 6.
    pub zstd_level: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            threads: 0,
            reorder: true,
            preserve_order: false,
            streaming: false,
            quality_mode: QualityMode::Lossless,
            id_mode: IdMode::Tokenize,
            length_mode: LengthMode::Auto,
            block_reads: 0,
            max_block_bases: DEFAULT_MAX_BLOCK_BASES,
            memory_limit_mb: 0,
            paired: false,
            quality_context_order: 1,
            quality_position_bins: 16,
            quality_zstd_wrap: true,
            overlap_long_reads: false,
            id_match_threshold: 0.8,
            zstd_level: 6,
        }
    }
}

impl Config {
    /// Resolved worker-thread count.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Whether the global reordering pass runs at all.
    pub fn reorder_enabled(&self) -> bool {
        self.reorder && !self.preserve_order && !self.streaming
    }

    /// Memory budget in bytes; `u64::MAX` when unlimited.
    pub fn memory_budget_bytes(&self) -> u64 {
        if self.memory_limit_mb == 0 {
            u64::MAX
        } else {
            self.memory_limit_mb as u64 * MB as u64
        }
    }

    /// Reads per block for a given class and median read length, honoring
    /// both the read-count and the base-count budget.
    pub fn reads_per_block(&self, class: LengthClass, median_len: usize) -> u32 {
        let configured = if self.block_reads == 0 {
            class.default_block_reads()
        } else {
            self.block_reads
        };
        let by_bases = (self.max_block_bases / median_len.max(1) as u64).max(1);
        configured.min(by_bases.min(u32::MAX as u64) as u32)
    }

    /// Reject inconsistent combinations before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.quality_mode == QualityMode::Qvz {
            return Err(FqcError::Usage(
                "qvz quality quantizer is not supported; use lossless, illumina8 or discard"
                    .into(),
            ));
        }
        if self.quality_context_order > 2 {
            return Err(FqcError::Usage(format!(
                "quality context order must be 0, 1 or 2 (got {})",
                self.quality_context_order
            )));
        }
        let bins = self.quality_position_bins;
        if bins == 0 || bins > 256 || !bins.is_power_of_two() {
            return Err(FqcError::Usage(format!(
                "quality position bins must be a power of two in 1..=256 (got {bins})"
            )));
        }
        if !(0.0..=1.0).contains(&self.id_match_threshold) {
            return Err(FqcError::Usage(
                "id match threshold must be within 0.0..=1.0".into(),
            ));
        }
        if self.streaming && self.reorder && !self.preserve_order {
            // Streaming cannot see the whole input, so reordering silently
            // degrades to input order; require the caller to say so.
            return Err(FqcError::Usage(
                "streaming mode is incompatible with reordering; pass preserve_order".into(),
            ));
        }
        if self.max_block_bases == 0 {
            return Err(FqcError::Usage("max_block_bases must be > 0".into()));
        }
        Ok(())
    }
}
