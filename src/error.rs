//! Error taxonomy for the FQC engine.
//!
//! Every fallible operation in the library returns [`Result<T>`] carrying an
//! [`FqcError`].  Variants map one-to-one onto the process exit codes used by
//! the `fqc` binary (see [`FqcError::exit_code`]); where it helps diagnosis a
//! variant carries the block id, file offset, or read index at fault.

use core::fmt;
use std::io;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FqcError>;

/// All error conditions surfaced by the FQC core.
#[derive(Debug)]
pub enum FqcError {
    /// Invalid configuration or argument combination.
    Usage(String),
    /// Underlying filesystem / stream failure.
    Io(io::Error),
    /// Malformed archive or FASTQ input. Offset is a byte position in the
    /// archive or a read index in FASTQ context, when known.
    Format { msg: String, offset: Option<u64> },
    /// A codec family byte the decoder does not recognize.
    UnsupportedCodec { tag: u8, block_id: Option<u32> },
    /// Stored and recomputed checksums disagree.
    ChecksumMismatch {
        block_id: Option<u32>,
        expected: u64,
        actual: u64,
    },
    /// A block failed to reconstruct for a reason other than its checksum
    /// (truncated substream, impossible symbol, inconsistent reorder map).
    Corrupted { msg: String, block_id: Option<u32> },
    /// The operation was cancelled via the shared stop token.
    Cancelled,
    /// An internal invariant was violated. Always a bug.
    Internal(String),
}

impl FqcError {
    /// Exit code contract for the CLI: 0 success, 1 usage, 2 I/O,
    /// 3 format/version, 4 checksum, 5 unsupported codec.
    pub fn exit_code(&self) -> i32 {
        match self {
            FqcError::Usage(_) => 1,
            FqcError::Io(_) => 2,
            FqcError::Format { .. } => 3,
            FqcError::ChecksumMismatch { .. } => 4,
            FqcError::UnsupportedCodec { .. } => 5,
            FqcError::Corrupted { .. } => 4,
            FqcError::Cancelled => 2,
            FqcError::Internal(_) => 2,
        }
    }

    /// Shorthand for a [`FqcError::Format`] without a position.
    pub fn format(msg: impl Into<String>) -> Self {
        FqcError::Format {
            msg: msg.into(),
            offset: None,
        }
    }

    /// Shorthand for a [`FqcError::Format`] anchored at a byte offset.
    pub fn format_at(msg: impl Into<String>, offset: u64) -> Self {
        FqcError::Format {
            msg: msg.into(),
            offset: Some(offset),
        }
    }

    /// Shorthand for a [`FqcError::Corrupted`] inside a specific block.
    pub fn corrupted_block(msg: impl Into<String>, block_id: u32) -> Self {
        FqcError::Corrupted {
            msg: msg.into(),
            block_id: Some(block_id),
        }
    }
}

impl fmt::Display for FqcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FqcError::Usage(msg) => write!(f, "bad usage: {msg}"),
            FqcError::Io(e) => write!(f, "i/o error: {e}"),
            FqcError::Format { msg, offset: None } => write!(f, "format error: {msg}"),
            FqcError::Format {
                msg,
                offset: Some(off),
            } => write!(f, "format error at offset {off}: {msg}"),
            FqcError::UnsupportedCodec { tag, block_id } => {
                write!(f, "unsupported codec tag 0x{tag:02X}")?;
                if let Some(b) = block_id {
                    write!(f, " in block {b}")?;
                }
                Ok(())
            }
            FqcError::ChecksumMismatch {
                block_id,
                expected,
                actual,
            } => {
                match block_id {
                    Some(b) => write!(f, "checksum mismatch in block {b}")?,
                    None => write!(f, "global checksum mismatch")?,
                }
                write!(f, " (stored {expected:016x}, computed {actual:016x})")
            }
            FqcError::Corrupted { msg, block_id } => {
                write!(f, "corrupted data")?;
                if let Some(b) = block_id {
                    write!(f, " in block {b}")?;
                }
                write!(f, ": {msg}")
            }
            FqcError::Cancelled => write!(f, "operation cancelled"),
            FqcError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for FqcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FqcError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FqcError {
    fn from(e: io::Error) -> Self {
        FqcError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(FqcError::Usage("x".into()).exit_code(), 1);
        assert_eq!(
            FqcError::Io(io::Error::new(io::ErrorKind::Other, "x")).exit_code(),
            2
        );
        assert_eq!(FqcError::format("x").exit_code(), 3);
        assert_eq!(
            FqcError::ChecksumMismatch {
                block_id: None,
                expected: 0,
                actual: 1
            }
            .exit_code(),
            4
        );
        assert_eq!(
            FqcError::UnsupportedCodec {
                tag: 0xF1,
                block_id: None
            }
            .exit_code(),
            5
        );
    }

    #[test]
    fn display_carries_block_context() {
        let e = FqcError::corrupted_block("sequence stream truncated", 3);
        let s = e.to_string();
        assert!(s.contains("block 3"), "{s}");
        assert!(s.contains("sequence stream truncated"), "{s}");
    }

    #[test]
    fn io_error_source_is_preserved() {
        use std::error::Error;
        let e = FqcError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(e.source().is_some());
    }
}
