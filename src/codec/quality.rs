//! Quality-string codec.
//!
//! Phred-33 quality bytes are arithmetic-coded under a context built from
//! the previous 0–2 symbols of the same read crossed with a position bin
//! (`bin = pos · B / read_len`). The two-symbol history resets at every
//! read boundary, and the decoder replays the identical context walk, so
//! the concrete model instances materialize in the same order on both
//! sides; they are kept in a hash map and created on first touch rather
//! than preallocated (94² × B instances for order 2 would be wasteful for
//! real data, which touches a small fraction of them).
//!
//! Lossy modes transform the bytes *before* modeling: `Illumina8` maps
//! each score onto its 8-bin representative, `Discard` stores nothing and
//! the decoder synthesizes `'!'`. The coded stream can optionally ride
//! through Zstd to pick up residual redundancy.

use std::collections::HashMap;

use crate::config::QualityMode;
use crate::error::{FqcError, Result};
use crate::rangecoder::{AdaptiveModel, RangeDecoder, RangeEncoder};
use crate::varint::{read_varint, write_varint};

use super::{CodecTag, SCM_ORDER1_V1, SCM_V1};

/// Lowest encodable quality byte (`'!'`).
pub const QUAL_MIN: u8 = b'!';
/// Highest encodable quality byte (`'~'`).
pub const QUAL_MAX: u8 = b'~';
/// Alphabet size: `'!'..='~'`.
pub const QUAL_ALPHABET: usize = (QUAL_MAX - QUAL_MIN + 1) as usize;

/// Placeholder byte synthesized for discarded qualities.
pub const QUAL_PLACEHOLDER: u8 = b'!';

const MODE_LOSSLESS: u8 = 0;
const MODE_ILLUMINA8: u8 = 1;
const MODE_DISCARD: u8 = 3;

// ---------------------------------------------------------------------------
// Illumina 8-bin quantization
// ---------------------------------------------------------------------------

/// Upper bin boundaries (exclusive) over Phred scores, with the final bin
/// open-ended.
const ILLUMINA8_BOUNDS: [u8; 6] = [10, 20, 25, 30, 35, 40];
/// Representative score per bin.
const ILLUMINA8_REPS: [u8; 7] = [6, 15, 22, 27, 33, 37, 40];

/// Quantize one Phred score onto its Illumina-8 representative.
#[inline]
pub fn illumina8_score(score: u8) -> u8 {
    for (i, &bound) in ILLUMINA8_BOUNDS.iter().enumerate() {
        if score < bound {
            return ILLUMINA8_REPS[i];
        }
    }
    ILLUMINA8_REPS[6]
}

/// Quantize a whole quality row; the block compressor also uses this to
/// hash the post-lossy bytes the decoder will reproduce.
pub fn quantize_illumina8(qual: &[u8]) -> Result<Vec<u8>> {
    qual.iter()
        .map(|&q| {
            if !(QUAL_MIN..=QUAL_MAX).contains(&q) {
                return Err(FqcError::format(format!(
                    "quality byte 0x{q:02X} outside Phred-33 range"
                )));
            }
            Ok(QUAL_MIN + illumina8_score(q - QUAL_MIN))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Context model
// ---------------------------------------------------------------------------

/// Lazily-materialized SCM model bank.
struct ContextBank {
    order: u8,
    bins: u32,
    models: HashMap<u32, AdaptiveModel>,
}

impl ContextBank {
    fn new(order: u8, bins: u16) -> Self {
        ContextBank {
            order,
            bins: u32::from(bins),
            models: HashMap::new(),
        }
    }

    #[inline]
    fn context_id(&self, prev1: u32, prev2: u32, pos: usize, len: usize) -> u32 {
        let bin = (pos as u64 * u64::from(self.bins) / len.max(1) as u64) as u32;
        let history = match self.order {
            0 => 0,
            1 => prev1,
            _ => prev1 * QUAL_ALPHABET as u32 + prev2,
        };
        history * self.bins + bin
    }

    #[inline]
    fn model(&mut self, ctx: u32) -> &mut AdaptiveModel {
        self.models
            .entry(ctx)
            .or_insert_with(|| AdaptiveModel::new(QUAL_ALPHABET))
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode one block's quality strings under `mode`. `order` and `bins`
/// come from the config; the payload is self-describing so the decoder
/// never consults the config.
pub fn encode_quals(
    quals: &[&[u8]],
    mode: QualityMode,
    order: u8,
    bins: u16,
    zstd_wrap: bool,
    zstd_level: i32,
) -> Result<(CodecTag, Vec<u8>)> {
    let tag = if order == 1 { SCM_ORDER1_V1 } else { SCM_V1 };
    if mode == QualityMode::Discard {
        return Ok((tag, vec![MODE_DISCARD]));
    }
    if mode == QualityMode::Qvz {
        return Err(FqcError::Internal(
            "qvz mode must be rejected at config validation".into(),
        ));
    }

    let quantized: Vec<Vec<u8>>;
    let (mode_byte, rows): (u8, Vec<&[u8]>) = match mode {
        QualityMode::Lossless => (MODE_LOSSLESS, quals.to_vec()),
        QualityMode::Illumina8 => {
            quantized = quals
                .iter()
                .map(|q| quantize_illumina8(q))
                .collect::<Result<_>>()?;
            (
                MODE_ILLUMINA8,
                quantized.iter().map(|v| v.as_slice()).collect(),
            )
        }
        _ => unreachable!(),
    };

    let mut enc = RangeEncoder::new();
    let mut bank = ContextBank::new(order, bins);
    for qual in &rows {
        let len = qual.len();
        let (mut prev1, mut prev2) = (0u32, 0u32);
        for (pos, &q) in qual.iter().enumerate() {
            if !(QUAL_MIN..=QUAL_MAX).contains(&q) {
                return Err(FqcError::format(format!(
                    "quality byte 0x{q:02X} outside Phred-33 range"
                )));
            }
            let sym = (q - QUAL_MIN) as usize;
            let ctx = bank.context_id(prev1, prev2, pos, len);
            bank.model(ctx).encode(&mut enc, sym);
            prev2 = prev1;
            prev1 = sym as u32;
        }
    }
    let coded = enc.finish();

    let mut out = Vec::with_capacity(coded.len() / 2 + 16);
    out.push(mode_byte);
    out.push(order);
    out.extend_from_slice(&bins.to_le_bytes());
    out.push(u8::from(zstd_wrap));
    if zstd_wrap {
        let compressed = zstd::bulk::compress(&coded, zstd_level)?;
        write_varint(&mut out, coded.len() as u64);
        write_varint(&mut out, compressed.len() as u64);
        out.extend_from_slice(&compressed);
    } else {
        write_varint(&mut out, coded.len() as u64);
        out.extend_from_slice(&coded);
    }
    Ok((tag, out))
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decoded qualities, or the signal that the archive stored none.
pub enum QualDecodeResult {
    Quals(Vec<Vec<u8>>),
    Discarded,
}

/// Decode one block's quality payload. `lengths` gives the per-read
/// symbol counts (equal to the sequence lengths).
pub fn decode_quals(payload: &[u8], lengths: &[u32]) -> Result<QualDecodeResult> {
    let mode = *payload
        .first()
        .ok_or_else(|| FqcError::format("empty quality payload"))?;
    if mode == MODE_DISCARD {
        return Ok(QualDecodeResult::Discarded);
    }
    if mode != MODE_LOSSLESS && mode != MODE_ILLUMINA8 {
        return Err(FqcError::format(format!(
            "unknown quality mode byte {mode:#x}"
        )));
    }
    if payload.len() < 5 {
        return Err(FqcError::format("truncated quality payload header"));
    }
    let order = payload[1];
    if order > 2 {
        return Err(FqcError::format(format!(
            "quality context order {order} out of range"
        )));
    }
    let bins = u16::from_le_bytes([payload[2], payload[3]]);
    if bins == 0 {
        return Err(FqcError::format("quality payload declares zero bins"));
    }
    let wrapped = payload[4] != 0;
    let mut pos = 5;

    let coded: Vec<u8> = if wrapped {
        let raw_len = read_varint(payload, &mut pos)? as usize;
        let zlen = read_varint(payload, &mut pos)? as usize;
        let end = pos
            .checked_add(zlen)
            .filter(|&e| e <= payload.len())
            .ok_or_else(|| FqcError::format("truncated quality payload"))?;
        let coded = zstd::bulk::decompress(&payload[pos..end], raw_len)
            .map_err(|e| FqcError::format(format!("quality payload zstd: {e}")))?;
        if coded.len() != raw_len {
            return Err(FqcError::format("quality payload size mismatch"));
        }
        coded
    } else {
        let len = read_varint(payload, &mut pos)? as usize;
        let end = pos
            .checked_add(len)
            .filter(|&e| e <= payload.len())
            .ok_or_else(|| FqcError::format("truncated quality payload"))?;
        payload[pos..end].to_vec()
    };

    let mut dec = RangeDecoder::new(&coded);
    let mut bank = ContextBank::new(order, bins);
    let mut quals = Vec::with_capacity(lengths.len());
    for &len in lengths {
        let len = len as usize;
        let mut qual = Vec::with_capacity(len);
        let (mut prev1, mut prev2) = (0u32, 0u32);
        for p in 0..len {
            let ctx = bank.context_id(prev1, prev2, p, len);
            let sym = bank.model(ctx).decode(&mut dec);
            qual.push(QUAL_MIN + sym as u8);
            prev2 = prev1;
            prev1 = sym as u32;
        }
        quals.push(qual);
    }
    Ok(QualDecodeResult::Quals(quals))
}

/// Placeholder qualities for a read of length `len`.
pub fn synthesize_qual(len: usize) -> Vec<u8> {
    vec![QUAL_PLACEHOLDER; len]
}
