//! Sequence codec dispatch.
//!
//! The length class picks the strategy: SHORT blocks go through the
//! assembly-based consensus codec ([`crate::abc`]); MEDIUM and LONG blocks
//! concatenate and Zstd the raw bases; LONG blocks may opt into the
//! prefix-overlap codec. A block whose Zstd output would exceed the input
//! is stored raw; the tag in the block header tells the decoder which
//! path was taken, so encoder heuristics never leak into the format.

use crate::abc;
use crate::config::LengthClass;
use crate::error::{FqcError, Result};
use crate::varint::{read_varint, write_varint};

use super::{CodecTag, ABC_V1, FAMILY_ABC, FAMILY_OVERLAP, FAMILY_RAW, FAMILY_ZSTD_PLAIN,
            OVERLAP_V1, RAW_V1, ZSTD_PLAIN_V1};

/// Longest suffix/prefix overlap the overlap codec searches for.
const OVERLAP_SEARCH_MAX: usize = 2048;

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode one block's sequences. Returns the codec tag for the block
/// header and the payload.
pub fn encode_seqs(
    seqs: &[&[u8]],
    class: LengthClass,
    overlap_long_reads: bool,
    zstd_level: i32,
) -> Result<(CodecTag, Vec<u8>)> {
    match class {
        LengthClass::Short => Ok((ABC_V1, abc::encode(seqs)?)),
        LengthClass::Medium => encode_zstd_plain(seqs, zstd_level),
        LengthClass::Long => {
            if overlap_long_reads {
                encode_overlap(seqs, zstd_level)
            } else {
                encode_zstd_plain(seqs, zstd_level)
            }
        }
    }
}

fn encode_zstd_plain(seqs: &[&[u8]], zstd_level: i32) -> Result<(CodecTag, Vec<u8>)> {
    let total: usize = seqs.iter().map(|s| s.len()).sum();
    let mut raw = Vec::with_capacity(total);
    for s in seqs {
        raw.extend_from_slice(s);
    }
    let compressed = zstd::bulk::compress(&raw, zstd_level)?;
    if compressed.len() >= raw.len() && !raw.is_empty() {
        // Incompressible block: store the bases verbatim.
        return Ok((RAW_V1, raw));
    }
    let mut out = Vec::with_capacity(compressed.len() + 8);
    write_varint(&mut out, raw.len() as u64);
    out.extend_from_slice(&compressed);
    Ok((ZSTD_PLAIN_V1, out))
}

fn encode_overlap(seqs: &[&[u8]], zstd_level: i32) -> Result<(CodecTag, Vec<u8>)> {
    let mut raw = Vec::new();
    let mut prev: &[u8] = &[];
    for s in seqs {
        let overlap = longest_overlap(prev, s);
        write_varint(&mut raw, overlap as u64);
        raw.extend_from_slice(&s[overlap..]);
        prev = s;
    }
    let compressed = zstd::bulk::compress(&raw, zstd_level)?;
    let mut out = Vec::with_capacity(compressed.len() + 8);
    write_varint(&mut out, raw.len() as u64);
    out.extend_from_slice(&compressed);
    Ok((OVERLAP_V1, out))
}

/// Longest `o` such that the last `o` bytes of `prev` equal the first `o`
/// bytes of `cur`, capped by the search bound.
fn longest_overlap(prev: &[u8], cur: &[u8]) -> usize {
    let cap = prev.len().min(cur.len()).min(OVERLAP_SEARCH_MAX);
    for o in (1..=cap).rev() {
        if prev[prev.len() - o..] == cur[..o] {
            return o;
        }
    }
    0
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode one block's sequence payload. `lengths` gives the per-read base
/// counts in block order.
pub fn decode_seqs(tag: CodecTag, payload: &[u8], lengths: &[u32]) -> Result<Vec<Vec<u8>>> {
    match tag.family() {
        FAMILY_ABC => abc::decode(payload, lengths),
        FAMILY_ZSTD_PLAIN => {
            let mut pos = 0;
            let raw_len = read_varint(payload, &mut pos)? as usize;
            let raw = zstd::bulk::decompress(&payload[pos..], raw_len)
                .map_err(|e| FqcError::format(format!("sequence payload zstd: {e}")))?;
            if raw.len() != raw_len {
                return Err(FqcError::format("sequence payload size mismatch"));
            }
            split_concat(&raw, lengths)
        }
        FAMILY_RAW => split_concat(payload, lengths),
        FAMILY_OVERLAP => decode_overlap(payload, lengths),
        _ => Err(FqcError::UnsupportedCodec {
            tag: tag.0,
            block_id: None,
        }),
    }
}

fn split_concat(raw: &[u8], lengths: &[u32]) -> Result<Vec<Vec<u8>>> {
    let total: u64 = lengths.iter().map(|&l| u64::from(l)).sum();
    if total != raw.len() as u64 {
        return Err(FqcError::format(format!(
            "sequence stream holds {} bases but lengths sum to {total}",
            raw.len()
        )));
    }
    let mut out = Vec::with_capacity(lengths.len());
    let mut pos = 0usize;
    for &len in lengths {
        let end = pos + len as usize;
        out.push(raw[pos..end].to_vec());
        pos = end;
    }
    Ok(out)
}

fn decode_overlap(payload: &[u8], lengths: &[u32]) -> Result<Vec<Vec<u8>>> {
    let mut pos = 0;
    let raw_len = read_varint(payload, &mut pos)? as usize;
    let raw = zstd::bulk::decompress(&payload[pos..], raw_len)
        .map_err(|e| FqcError::format(format!("sequence payload zstd: {e}")))?;
    if raw.len() != raw_len {
        return Err(FqcError::format("sequence payload size mismatch"));
    }

    let mut out: Vec<Vec<u8>> = Vec::with_capacity(lengths.len());
    let mut pos = 0usize;
    for (i, &len) in lengths.iter().enumerate() {
        let len = len as usize;
        let overlap = read_varint(&raw, &mut pos)? as usize;
        if overlap > len {
            return Err(FqcError::format("overlap exceeds read length"));
        }
        let mut seq = Vec::with_capacity(len);
        if overlap > 0 {
            let prev = out
                .last()
                .ok_or_else(|| FqcError::format("overlap into nonexistent previous read"))?;
            if overlap > prev.len() {
                return Err(FqcError::format("overlap exceeds previous read length"));
            }
            seq.extend_from_slice(&prev[prev.len() - overlap..]);
        }
        let tail_len = len - overlap;
        let end = pos
            .checked_add(tail_len)
            .filter(|&e| e <= raw.len())
            .ok_or_else(|| {
                FqcError::format(format!("truncated overlap stream at read {i}"))
            })?;
        seq.extend_from_slice(&raw[pos..end]);
        pos = end;
        out.push(seq);
    }
    if pos != raw.len() {
        return Err(FqcError::format("trailing bytes in overlap stream"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_refs(rows: &[Vec<u8>]) -> Vec<&[u8]> {
        rows.iter().map(|v| v.as_slice()).collect()
    }

    fn lengths(rows: &[Vec<u8>]) -> Vec<u32> {
        rows.iter().map(|v| v.len() as u32).collect()
    }

    /// Deterministic pseudo-random ACGTN sequence.
    fn synth_seq(seed: u64, len: usize, with_n: bool) -> Vec<u8> {
        let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                if with_n && x % 97 == 0 {
                    b'N'
                } else {
                    b"ACGT"[(x & 3) as usize]
                }
            })
            .collect()
    }

    #[test]
    fn zstd_plain_round_trip_variable_lengths() {
        let rows: Vec<Vec<u8>> = (0..200)
            .map(|i| synth_seq(i, 800 + (i as usize % 400), true))
            .collect();
        let (tag, payload) =
            encode_seqs(&as_refs(&rows), LengthClass::Medium, false, 3).unwrap();
        assert!(tag == ZSTD_PLAIN_V1 || tag == RAW_V1);
        assert_eq!(decode_seqs(tag, &payload, &lengths(&rows)).unwrap(), rows);
    }

    #[test]
    fn short_class_routes_to_abc() {
        let template = synth_seq(1, 150, false);
        let rows: Vec<Vec<u8>> = (0..100)
            .map(|i| {
                let mut s = template.clone();
                s.rotate_left(i as usize % 3);
                s
            })
            .collect();
        let (tag, payload) =
            encode_seqs(&as_refs(&rows), LengthClass::Short, false, 3).unwrap();
        assert_eq!(tag, ABC_V1);
        assert_eq!(decode_seqs(tag, &payload, &lengths(&rows)).unwrap(), rows);
    }

    #[test]
    fn overlap_codec_round_trip() {
        // Simulated long reads walking along one genome: heavy suffix/
        // prefix overlap between consecutive reads.
        let genome = synth_seq(42, 20_000, false);
        let rows: Vec<Vec<u8>> = (0..30)
            .map(|i| genome[i * 500..i * 500 + 4000].to_vec())
            .collect();
        let (tag, payload) = encode_seqs(&as_refs(&rows), LengthClass::Long, true, 3).unwrap();
        assert_eq!(tag, OVERLAP_V1);
        assert_eq!(decode_seqs(tag, &payload, &lengths(&rows)).unwrap(), rows);
    }

    #[test]
    fn long_without_flag_stays_on_zstd() {
        let rows: Vec<Vec<u8>> = (0..5).map(|i| synth_seq(i, 12_000, true)).collect();
        let (tag, _) = encode_seqs(&as_refs(&rows), LengthClass::Long, false, 3).unwrap();
        assert_ne!(tag.family(), FAMILY_OVERLAP);
    }

    #[test]
    fn longest_overlap_finds_maximal() {
        assert_eq!(longest_overlap(b"AAACGT", b"ACGTTT"), 4);
        assert_eq!(longest_overlap(b"", b"ACGT"), 0);
        assert_eq!(longest_overlap(b"ACGT", b"ACGT"), 4);
        // Prefers the longest, not the first, match.
        assert_eq!(longest_overlap(b"ABAB", b"ABAB"), 4);
    }

    #[test]
    fn length_sum_mismatch_is_corruption() {
        let rows: Vec<Vec<u8>> = vec![b"ACGT".to_vec()];
        let (tag, payload) =
            encode_seqs(&as_refs(&rows), LengthClass::Medium, false, 3).unwrap();
        assert!(decode_seqs(tag, &payload, &[5]).is_err());
    }
}
