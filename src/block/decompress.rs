//! Block decompression and corruption handling.

use crate::archive::format::{BlockHeader, GlobalHeader, IndexEntry};
use crate::codec::id::{synthesize_id, synthesize_paired_id, IdDecodeResult};
use crate::codec::quality::{synthesize_qual, QualDecodeResult};
use crate::codec::{id, quality, sequence};
use crate::error::{FqcError, Result};
use crate::fastq::ReadRecord;
use crate::varint::read_delta_u64s;

use super::logical_checksum;

/// Decode one block from its raw bytes (header plus payload), validating
/// the logical checksum after reconstruction.
///
/// Needs only the global header and the block's index entry, never any
/// other block; that is the random-access contract of the format.
pub fn decompress_block(
    bytes: &[u8],
    entry: &IndexEntry,
    global: &GlobalHeader,
) -> Result<Vec<ReadRecord>> {
    let block_id = {
        // Header id is authoritative for error reports even if parsing
        // later fails; fall back to the entry position.
        BlockHeader::from_bytes(bytes)
            .map(|(h, _)| h.block_id)
            .unwrap_or(u32::MAX)
    };
    decompress_inner(bytes, entry, global).map_err(|e| match e {
        // Attach the block id to errors that lack one.
        FqcError::Format { msg, offset } => FqcError::Corrupted {
            msg: match offset {
                Some(off) => format!("{msg} (at offset {off})"),
                None => msg,
            },
            block_id: Some(block_id),
        },
        FqcError::UnsupportedCodec { tag, block_id: None } => FqcError::UnsupportedCodec {
            tag,
            block_id: Some(block_id),
        },
        other => other,
    })
}

fn decompress_inner(
    bytes: &[u8],
    entry: &IndexEntry,
    global: &GlobalHeader,
) -> Result<Vec<ReadRecord>> {
    let (header, header_size) = BlockHeader::from_bytes(bytes)?;
    let payload = bytes
        .get(header_size as usize..)
        .ok_or_else(|| FqcError::format("block bytes shorter than header"))?;
    if header.compressed_size != payload.len() as u64 {
        return Err(FqcError::format(format!(
            "block payload holds {} bytes but header declares {}",
            payload.len(),
            header.compressed_size
        )));
    }
    if header.uncompressed_count != entry.read_count {
        return Err(FqcError::format(format!(
            "block header count {} disagrees with index entry {}",
            header.uncompressed_count, entry.read_count
        )));
    }
    let n_reads = header.uncompressed_count as usize;

    for tag in [
        header.codec_ids,
        header.codec_seq,
        header.codec_qual,
        header.codec_aux,
    ] {
        tag.validate_for_decode(header.block_id)?;
    }

    let ids_bytes = substream(payload, &header, 0)?;
    let seq_bytes = substream(payload, &header, 1)?;
    let qual_bytes = substream(payload, &header, 2)?;
    let aux_bytes = substream(payload, &header, 3)?;

    // AUX first: every other stream needs the lengths.
    let lengths: Vec<u32> = if header.uniform_read_length != 0 || n_reads == 0 {
        vec![header.uniform_read_length; n_reads]
    } else {
        let mut pos = 0;
        let values = read_delta_u64s(aux_bytes, &mut pos)?;
        if pos != aux_bytes.len() {
            return Err(FqcError::format("trailing bytes in aux stream"));
        }
        if values.len() != n_reads {
            return Err(FqcError::format(format!(
                "aux stream holds {} lengths for {} reads",
                values.len(),
                n_reads
            )));
        }
        values
            .iter()
            .map(|&v| {
                u32::try_from(v)
                    .map_err(|_| FqcError::format("read length in aux stream exceeds u32"))
            })
            .collect::<Result<_>>()?
    };

    let seqs = sequence::decode_seqs(header.codec_seq, seq_bytes, &lengths)?;

    let quals = match quality::decode_quals(qual_bytes, &lengths)? {
        QualDecodeResult::Quals(q) => Some(q),
        QualDecodeResult::Discarded => None,
    };

    let ids = match id::decode_ids(ids_bytes, n_reads)? {
        IdDecodeResult::Ids(ids) => Some(ids),
        IdDecodeResult::Discarded => None,
    };

    // Checksum over exactly what was hashed on the way in.
    let actual = logical_checksum(ids.as_deref(), &seqs, quals.as_deref(), &lengths);
    if actual != header.block_xxhash64 {
        return Err(FqcError::ChecksumMismatch {
            block_id: Some(header.block_id),
            expected: header.block_xxhash64,
            actual,
        });
    }

    // Materialize discarded streams after hashing.
    let ids = ids.unwrap_or_else(|| {
        (0..n_reads as u64)
            .map(|i| synthesize_block_id(global, entry.archive_id_start + i))
            .collect()
    });
    let quals = quals.unwrap_or_else(|| {
        lengths.iter().map(|&l| synthesize_qual(l as usize)).collect()
    });

    Ok(ids
        .into_iter()
        .zip(seqs)
        .zip(quals)
        .map(|((id, seq), qual)| ReadRecord { id, seq, qual })
        .collect())
}

/// One substream slice, bounds-checked against the payload.
fn substream<'p>(payload: &'p [u8], header: &BlockHeader, i: usize) -> Result<&'p [u8]> {
    let start = header.offsets[i] as usize;
    let end = start
        .checked_add(header.sizes[i] as usize)
        .filter(|&e| e <= payload.len())
        .ok_or_else(|| FqcError::format("substream locator out of range"))?;
    payload
        .get(start..end)
        .ok_or_else(|| FqcError::format("substream locator out of range"))
}

/// Synthesized id for read number `n` (archive order).
fn synthesize_block_id(global: &GlobalHeader, n: u64) -> Vec<u8> {
    if global.paired() {
        synthesize_paired_id(n / 2, (n % 2) as u8 + 1)
    } else {
        synthesize_id(n)
    }
}

/// Placeholder records standing in for a corrupted block when the caller
/// opted into `skip_corrupted`: `N` bases, `'!'` qualities, synthesized
/// ids. Lengths come from the block header when it is still readable,
/// else a single base.
pub fn placeholder_records(
    bytes: &[u8],
    entry: &IndexEntry,
    global: &GlobalHeader,
) -> Vec<ReadRecord> {
    let len = BlockHeader::from_bytes(bytes)
        .map(|(h, _)| h.uniform_read_length as usize)
        .unwrap_or(0)
        .max(1);
    (0..u64::from(entry.read_count))
        .map(|i| ReadRecord {
            id: synthesize_block_id(global, entry.archive_id_start + i),
            seq: vec![b'N'; len],
            qual: vec![b'!'; len],
        })
        .collect()
}
