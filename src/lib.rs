//! fqc: a block-seekable archive engine for FASTQ read files.
//!
//! The engine compresses short/long biological reads losslessly (or with
//! configurable lossy quality/id handling) into the seekable `.fqc`
//! container. Compression runs in two phases: a global analysis pass that
//! discovers a read permutation maximizing local redundancy, then a
//! block-independent columnar pass in which ids, sequences, qualities,
//! and read lengths each travel their own codec.
//!
//! # Entry points
//!
//! - [`ops::compress`] / [`ops::compress_path`]: FASTQ to archive
//! - [`ops::decompress`]: archive to FASTQ, whole or by range
//! - [`ops::verify`]: integrity check, quick or full
//! - [`ops::info`]: header and index summary
//!
//! # Layering
//!
//! `varint` / `basepack` / `xxhash` are the byte-level primitives;
//! `rangecoder` is the adaptive arithmetic coder; `codec` and `abc` build
//! the per-substream codecs on top; `analyzer` computes the global
//! reorder; `archive` owns the container; `block` assembles one
//! independently-decodable unit; `pipeline` runs the three-stage parallel
//! executor; `ops` wires it all together.

pub mod abc;
pub mod analyzer;
pub mod archive;
pub mod basepack;
pub mod block;
pub mod codec;
pub mod config;
pub mod display;
pub mod error;
pub mod fastq;
pub mod ops;
pub mod pipeline;
pub mod rangecoder;
pub mod reorder_map;
pub mod stats;
pub mod varint;
pub mod xxhash;

pub use config::{Config, IdMode, LengthClass, LengthMode, QualityMode};
pub use error::{FqcError, Result};
pub use ops::{DecodeOptions, OutputSink, RangeSelector};
pub use stats::{ArchiveSummary, CompressStats, DecompressStats, VerifyMode, VerifyReport};

pub const FQC_VERSION_MAJOR: u32 = 1;
pub const FQC_VERSION_MINOR: u32 = 0;
pub const FQC_VERSION_RELEASE: u32 = 0;
pub const FQC_VERSION_STRING: &str = "1.0.0";

/// Library version string (matches the crate version).
pub fn version_string() -> &'static str {
    FQC_VERSION_STRING
}
