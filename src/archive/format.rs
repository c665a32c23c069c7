//! On-disk layout of the `.fqc` container.
//!
//! ```text
//! [MAGIC 8] [VERSION 1] [GLOBAL HEADER] [BLOCK 0] … [BLOCK N-1]
//! [REORDER MAP?] [BLOCK INDEX] [FOOTER 32]
//! ```
//!
//! All integers are little-endian. Every variable-size structure leads
//! with its own `header_size` (or `entry_size`), and readers skip unknown
//! trailing bytes whenever a stored size exceeds the constant they were
//! built with — that is the whole forward-compatibility story, so field
//! widths and offsets here are frozen: changing one requires a major
//! version bump.

use crate::codec::CodecTag;
use crate::config::{IdMode, LengthClass, QualityMode};
use crate::error::{FqcError, Result};

// ---------------------------------------------------------------------------
// Magic & version
// ---------------------------------------------------------------------------

/// Leading magic: `0x89 "FQC" CR LF SUB LF` — binary marker plus newline
/// bait that catches text-mode corruption, PNG style.
pub const MAGIC: [u8; 8] = [0x89, b'F', b'Q', b'C', 0x0D, 0x0A, 0x1A, 0x0A];

/// Trailing footer magic.
pub const MAGIC_END: [u8; 8] = *b"FQC_EOF\0";

pub const FORMAT_MAJOR: u8 = 1;
pub const FORMAT_MINOR: u8 = 0;

/// Version byte: `major << 4 | minor`.
pub const VERSION_BYTE: u8 = (FORMAT_MAJOR << 4) | FORMAT_MINOR;

/// Bytes before the global header.
pub const PREAMBLE_SIZE: u64 = MAGIC.len() as u64 + 1;

// ---------------------------------------------------------------------------
// Global header flags
// ---------------------------------------------------------------------------

pub const FLAG_PAIRED: u64 = 1 << 0;
pub const FLAG_PRESERVE_ORDER: u64 = 1 << 1;
/// Reserved; a reader finding it set must refuse the archive.
pub const FLAG_LEGACY_LONG_READ: u64 = 1 << 2;
pub const FLAG_QUALITY_MODE_SHIFT: u64 = 3; // 2 bits
pub const FLAG_ID_MODE_SHIFT: u64 = 5; // 2 bits
pub const FLAG_HAS_REORDER_MAP: u64 = 1 << 7;
pub const FLAG_PE_LAYOUT_SHIFT: u64 = 8; // 2 bits
pub const FLAG_LENGTH_CLASS_SHIFT: u64 = 10; // 2 bits
pub const FLAG_STREAMING: u64 = 1 << 12;

/// Interleaved mates, the only paired-end layout this build writes.
pub const PE_LAYOUT_INTERLEAVED: u64 = 0;

/// `compression_algo_family` value for the Zstd-backed substream set.
pub const ALGO_FAMILY_ZSTD: u8 = 0;

/// `checksum_type` value for XXH64.
pub const CHECKSUM_XXH64: u8 = 0;

// ---------------------------------------------------------------------------
// Global header
// ---------------------------------------------------------------------------

/// Fixed-field portion of the global header (excluding the filename).
pub const GLOBAL_HEADER_FIXED_SIZE: u32 = 32;

/// Archive-wide metadata, written once at the front of the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalHeader {
    pub flags: u64,
    pub compression_algo_family: u8,
    pub checksum_type: u8,
    pub total_read_count: u64,
    pub original_filename: Vec<u8>,
    /// Seconds since the Unix epoch at archive creation.
    pub timestamp: u64,
}

impl GlobalHeader {
    /// Serialized size including the leading `header_size` field.
    pub fn size(&self) -> u32 {
        GLOBAL_HEADER_FIXED_SIZE + self.original_filename.len() as u32
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size() as usize);
        buf.extend_from_slice(&self.size().to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.push(self.compression_algo_family);
        buf.push(self.checksum_type);
        buf.extend_from_slice(&self.total_read_count.to_le_bytes());
        buf.extend_from_slice(&(self.original_filename.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.original_filename);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf
    }

    /// Parse from a buffer beginning at the header's first byte. Returns
    /// the header and its stored size (so callers can skip past unknown
    /// trailing payload).
    pub fn from_bytes(buf: &[u8]) -> Result<(Self, u32)> {
        if buf.len() < GLOBAL_HEADER_FIXED_SIZE as usize {
            return Err(FqcError::format("truncated global header"));
        }
        let header_size = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if header_size < GLOBAL_HEADER_FIXED_SIZE || (header_size as usize) > buf.len() {
            return Err(FqcError::format(format!(
                "global header size {header_size} out of range"
            )));
        }
        let flags = u64::from_le_bytes(buf[4..12].try_into().unwrap());
        if flags & FLAG_LEGACY_LONG_READ != 0 {
            return Err(FqcError::format(
                "archive sets the reserved legacy long-read flag",
            ));
        }
        let compression_algo_family = buf[12];
        let checksum_type = buf[13];
        let total_read_count = u64::from_le_bytes(buf[14..22].try_into().unwrap());
        let filename_len = u16::from_le_bytes(buf[22..24].try_into().unwrap()) as usize;
        let fixed_tail = 8usize; // timestamp
        if 24 + filename_len + fixed_tail > header_size as usize {
            return Err(FqcError::format("global header filename overruns header"));
        }
        let original_filename = buf[24..24 + filename_len].to_vec();
        let ts_at = 24 + filename_len;
        let timestamp = u64::from_le_bytes(buf[ts_at..ts_at + 8].try_into().unwrap());
        Ok((
            GlobalHeader {
                flags,
                compression_algo_family,
                checksum_type,
                total_read_count,
                original_filename,
                timestamp,
            },
            header_size,
        ))
    }

    // -- flag accessors ------------------------------------------------------

    pub fn paired(&self) -> bool {
        self.flags & FLAG_PAIRED != 0
    }

    pub fn preserve_order(&self) -> bool {
        self.flags & FLAG_PRESERVE_ORDER != 0
    }

    pub fn has_reorder_map(&self) -> bool {
        self.flags & FLAG_HAS_REORDER_MAP != 0
    }

    pub fn streaming(&self) -> bool {
        self.flags & FLAG_STREAMING != 0
    }

    pub fn quality_mode(&self) -> Result<QualityMode> {
        QualityMode::from_flag_bits((self.flags >> FLAG_QUALITY_MODE_SHIFT) & 0b11)
    }

    pub fn id_mode(&self) -> Result<IdMode> {
        IdMode::from_flag_bits((self.flags >> FLAG_ID_MODE_SHIFT) & 0b11)
    }

    pub fn length_class(&self) -> Result<LengthClass> {
        LengthClass::from_flag_bits((self.flags >> FLAG_LENGTH_CLASS_SHIFT) & 0b11)
    }

    pub fn pe_layout(&self) -> u64 {
        (self.flags >> FLAG_PE_LAYOUT_SHIFT) & 0b11
    }
}

/// Assemble the flags word from the archive-wide choices.
#[allow(clippy::too_many_arguments)]
pub fn build_flags(
    paired: bool,
    preserve_order: bool,
    quality_mode: QualityMode,
    id_mode: IdMode,
    has_reorder_map: bool,
    length_class: LengthClass,
    streaming: bool,
) -> u64 {
    let mut flags = 0u64;
    if paired {
        flags |= FLAG_PAIRED | (PE_LAYOUT_INTERLEAVED << FLAG_PE_LAYOUT_SHIFT);
    }
    if preserve_order {
        flags |= FLAG_PRESERVE_ORDER;
    }
    flags |= quality_mode.flag_bits() << FLAG_QUALITY_MODE_SHIFT;
    flags |= id_mode.flag_bits() << FLAG_ID_MODE_SHIFT;
    if has_reorder_map {
        flags |= FLAG_HAS_REORDER_MAP;
    }
    flags |= length_class.flag_bits() << FLAG_LENGTH_CLASS_SHIFT;
    if streaming {
        flags |= FLAG_STREAMING;
    }
    flags
}

// ---------------------------------------------------------------------------
// Block header
// ---------------------------------------------------------------------------

/// Serialized block header size this build writes.
pub const BLOCK_HEADER_SIZE: u32 = 104;

/// Per-block metadata preceding the block payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_id: u32,
    pub checksum_type: u8,
    pub codec_ids: CodecTag,
    pub codec_seq: CodecTag,
    pub codec_qual: CodecTag,
    pub codec_aux: CodecTag,
    /// XXH64 over the uncompressed logical streams.
    pub block_xxhash64: u64,
    pub uncompressed_count: u32,
    /// 0 ⇒ variable lengths, stored in the aux stream.
    pub uniform_read_length: u32,
    /// Total payload bytes following this header.
    pub compressed_size: u64,
    /// Substream locators, relative to the first payload byte.
    pub offsets: [u64; 4],
    pub sizes: [u64; 4],
}

impl BlockHeader {
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE as usize] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&BLOCK_HEADER_SIZE.to_le_bytes());
        buf[4..8].copy_from_slice(&self.block_id.to_le_bytes());
        buf[8] = self.checksum_type;
        buf[9] = self.codec_ids.0;
        buf[10] = self.codec_seq.0;
        buf[11] = self.codec_qual.0;
        buf[12] = self.codec_aux.0;
        // buf[13..16] padding
        buf[16..24].copy_from_slice(&self.block_xxhash64.to_le_bytes());
        buf[24..28].copy_from_slice(&self.uncompressed_count.to_le_bytes());
        buf[28..32].copy_from_slice(&self.uniform_read_length.to_le_bytes());
        buf[32..40].copy_from_slice(&self.compressed_size.to_le_bytes());
        for (i, &off) in self.offsets.iter().enumerate() {
            buf[40 + i * 8..48 + i * 8].copy_from_slice(&off.to_le_bytes());
        }
        for (i, &size) in self.sizes.iter().enumerate() {
            buf[72 + i * 8..80 + i * 8].copy_from_slice(&size.to_le_bytes());
        }
        buf
    }

    /// Parse from a buffer starting at the header. Returns the header and
    /// its stored size.
    pub fn from_bytes(buf: &[u8]) -> Result<(Self, u32)> {
        if buf.len() < BLOCK_HEADER_SIZE as usize {
            return Err(FqcError::format("truncated block header"));
        }
        let header_size = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if header_size < BLOCK_HEADER_SIZE {
            return Err(FqcError::format(format!(
                "block header size {header_size} smaller than required {BLOCK_HEADER_SIZE}"
            )));
        }
        let mut offsets = [0u64; 4];
        let mut sizes = [0u64; 4];
        for i in 0..4 {
            offsets[i] = u64::from_le_bytes(buf[40 + i * 8..48 + i * 8].try_into().unwrap());
            sizes[i] = u64::from_le_bytes(buf[72 + i * 8..80 + i * 8].try_into().unwrap());
        }
        Ok((
            BlockHeader {
                block_id: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
                checksum_type: buf[8],
                codec_ids: CodecTag(buf[9]),
                codec_seq: CodecTag(buf[10]),
                codec_qual: CodecTag(buf[11]),
                codec_aux: CodecTag(buf[12]),
                block_xxhash64: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
                uncompressed_count: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
                uniform_read_length: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
                compressed_size: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
                offsets,
                sizes,
            },
            header_size,
        ))
    }
}

// ---------------------------------------------------------------------------
// Block index
// ---------------------------------------------------------------------------

/// Index section header: `header_size u32 ∥ entry_size u32 ∥ num_blocks u64`.
pub const INDEX_HEADER_SIZE: u32 = 16;

/// Serialized index entry size this build writes.
pub const INDEX_ENTRY_SIZE: u32 = 32;

/// One block locator in the trailing index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexEntry {
    /// File offset of the block header.
    pub offset: u64,
    /// Block header + payload bytes.
    pub compressed_size: u64,
    pub archive_id_start: u64,
    pub read_count: u32,
}

impl IndexEntry {
    pub fn to_bytes(&self) -> [u8; INDEX_ENTRY_SIZE as usize] {
        let mut buf = [0u8; INDEX_ENTRY_SIZE as usize];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.archive_id_start.to_le_bytes());
        buf[24..28].copy_from_slice(&self.read_count.to_le_bytes());
        // buf[28..32] padding
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 28 {
            return Err(FqcError::format("truncated index entry"));
        }
        Ok(IndexEntry {
            offset: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            compressed_size: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            archive_id_start: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            read_count: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        })
    }
}

/// Serialize the whole index section.
pub fn index_to_bytes(entries: &[IndexEntry]) -> Vec<u8> {
    let mut buf =
        Vec::with_capacity(INDEX_HEADER_SIZE as usize + entries.len() * INDEX_ENTRY_SIZE as usize);
    buf.extend_from_slice(&INDEX_HEADER_SIZE.to_le_bytes());
    buf.extend_from_slice(&INDEX_ENTRY_SIZE.to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for e in entries {
        buf.extend_from_slice(&e.to_bytes());
    }
    buf
}

/// Parse the index section, tolerating larger-than-known headers and
/// entries, and validating the §3 block invariants (strictly increasing,
/// gap-free archive id ranges).
pub fn index_from_bytes(buf: &[u8], total_read_count: u64) -> Result<Vec<IndexEntry>> {
    if buf.len() < INDEX_HEADER_SIZE as usize {
        return Err(FqcError::format("truncated block index header"));
    }
    let header_size = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let entry_size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let num_blocks = u64::from_le_bytes(buf[8..16].try_into().unwrap());
    if header_size < INDEX_HEADER_SIZE || entry_size < 28 {
        return Err(FqcError::format("block index sizes out of range"));
    }
    let body = buf
        .get(header_size as usize..)
        .ok_or_else(|| FqcError::format("truncated block index"))?;
    let need = num_blocks
        .checked_mul(u64::from(entry_size))
        .ok_or_else(|| FqcError::format("block index size overflows"))?;
    if need > body.len() as u64 {
        return Err(FqcError::format("block index body shorter than declared"));
    }

    let mut entries = Vec::with_capacity(num_blocks as usize);
    let mut expected_start = 0u64;
    for i in 0..num_blocks as usize {
        let at = i * entry_size as usize;
        let entry = IndexEntry::from_bytes(&body[at..at + entry_size as usize])?;
        if entry.archive_id_start != expected_start {
            return Err(FqcError::format(format!(
                "block {i} starts at archive id {} but {} expected (ranges must be contiguous)",
                entry.archive_id_start, expected_start
            )));
        }
        expected_start += u64::from(entry.read_count);
        entries.push(entry);
    }
    if expected_start != total_read_count {
        return Err(FqcError::format(format!(
            "index covers {expected_start} reads but header declares {total_read_count}"
        )));
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Footer
// ---------------------------------------------------------------------------

pub const FOOTER_SIZE: u64 = 32;

/// Trailing fixed-size locator: the only thing a reader can find without
/// any other information, via `SEEK_END`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Footer {
    pub index_offset: u64,
    /// 0 ⇒ no reorder map present.
    pub reorder_map_offset: u64,
    pub global_checksum: u64,
}

impl Footer {
    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE as usize] {
        let mut buf = [0u8; FOOTER_SIZE as usize];
        buf[0..8].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.reorder_map_offset.to_le_bytes());
        buf[16..24].copy_from_slice(&self.global_checksum.to_le_bytes());
        buf[24..32].copy_from_slice(&MAGIC_END);
        buf
    }

    pub fn from_bytes(buf: &[u8; FOOTER_SIZE as usize]) -> Result<Self> {
        if buf[24..32] != MAGIC_END {
            return Err(FqcError::format(
                "footer magic missing (file truncated or not an fqc archive)",
            ));
        }
        Ok(Footer {
            index_offset: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            reorder_map_offset: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            global_checksum: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
        })
    }
}
