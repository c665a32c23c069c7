//! Substream codec registry.
//!
//! Every block substream carries a one-byte codec tag: high nibble = codec
//! family, low nibble = format version within the family. An unknown family
//! is a hard decode error; a known family at a higher-than-known version is
//! decoded on a best-effort basis after a warning, per the archive's
//! forward-compatibility policy.

pub mod id;
pub mod quality;
pub mod sequence;

use core::fmt;

use crate::display::display_line;
use crate::error::{FqcError, Result};

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

/// Uncompressed passthrough.
pub const FAMILY_RAW: u8 = 0x0;
/// Assembly-based consensus codec for SHORT sequences.
pub const FAMILY_ABC: u8 = 0x1;
/// Statistical context-mixing quality codec.
pub const FAMILY_SCM: u8 = 0x2;
/// Tokenized ids over LZMA. Recognized but never produced; no decoder.
pub const FAMILY_DELTA_LZMA: u8 = 0x3;
/// Tokenized ids over Zstd.
pub const FAMILY_DELTA_ZSTD: u8 = 0x4;
/// Delta + varint integer stream (aux read lengths).
pub const FAMILY_DELTA_VARINT: u8 = 0x5;
/// Overlap codec for LONG sequences (opt-in).
pub const FAMILY_OVERLAP: u8 = 0x6;
/// Concatenated sequences over Zstd (MEDIUM/LONG default).
pub const FAMILY_ZSTD_PLAIN: u8 = 0x7;
/// Order-1 fast path of the SCM quality codec.
pub const FAMILY_SCM_ORDER1: u8 = 0x8;
/// Reserved for out-of-tree codecs; never decodable here.
pub const FAMILY_EXTERNAL: u8 = 0xE;
/// Permanently reserved.
pub const FAMILY_RESERVED: u8 = 0xF;

// ---------------------------------------------------------------------------
// CodecTag
// ---------------------------------------------------------------------------

/// One-byte `(family, version)` codec identifier.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CodecTag(pub u8);

/// Version-1 tags this build produces.
pub const RAW_V1: CodecTag = CodecTag(0x01);
pub const ABC_V1: CodecTag = CodecTag(0x11);
pub const SCM_V1: CodecTag = CodecTag(0x21);
pub const DELTA_ZSTD_V1: CodecTag = CodecTag(0x41);
pub const DELTA_VARINT_V1: CodecTag = CodecTag(0x51);
pub const OVERLAP_V1: CodecTag = CodecTag(0x61);
pub const ZSTD_PLAIN_V1: CodecTag = CodecTag(0x71);
pub const SCM_ORDER1_V1: CodecTag = CodecTag(0x81);

/// Newest format version this build understands, per family.
fn known_version(family: u8) -> Option<u8> {
    match family {
        FAMILY_RAW
        | FAMILY_ABC
        | FAMILY_SCM
        | FAMILY_DELTA_ZSTD
        | FAMILY_DELTA_VARINT
        | FAMILY_OVERLAP
        | FAMILY_ZSTD_PLAIN
        | FAMILY_SCM_ORDER1 => Some(1),
        _ => None,
    }
}

impl CodecTag {
    #[inline]
    pub fn family(self) -> u8 {
        self.0 >> 4
    }

    #[inline]
    pub fn version(self) -> u8 {
        self.0 & 0x0F
    }

    /// Gate a tag read from a block header before dispatching to a decoder.
    ///
    /// Unknown families (including EXTERNAL and RESERVED, which this build
    /// can never interpret) fail hard; a higher version of a known family
    /// warns and proceeds.
    pub fn validate_for_decode(self, block_id: u32) -> Result<()> {
        match known_version(self.family()) {
            None => Err(FqcError::UnsupportedCodec {
                tag: self.0,
                block_id: Some(block_id),
            }),
            Some(known) => {
                if self.version() > known {
                    display_line(
                        2,
                        &format!(
                            "warning: block {} carries codec 0x{:02X} newer than this build \
                             (known version {}); attempting decode",
                            block_id, self.0, known
                        ),
                    );
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.family() {
            FAMILY_RAW => "raw",
            FAMILY_ABC => "abc",
            FAMILY_SCM => "scm",
            FAMILY_DELTA_LZMA => "delta-lzma",
            FAMILY_DELTA_ZSTD => "delta-zstd",
            FAMILY_DELTA_VARINT => "delta-varint",
            FAMILY_OVERLAP => "overlap",
            FAMILY_ZSTD_PLAIN => "zstd-plain",
            FAMILY_SCM_ORDER1 => "scm-order1",
            FAMILY_EXTERNAL => "external",
            _ => "reserved",
        };
        write!(f, "{}v{}", name, self.version())
    }
}
