//! ABC decoding: replay the consensus walk and rebuild each read.

use crate::basepack::{apply_n_positions, codes_to_seq, revcomp_codes};
use crate::error::{FqcError, Result};
use crate::rangecoder::model::decode_varint;
use crate::rangecoder::RangeDecoder;
use crate::varint::read_varint;

use super::{Contig, Models};

/// Decode an ABC payload back into ASCII sequences. `lengths` gives the
/// per-read base counts in block order and must match the stored count.
pub fn decode(payload: &[u8], lengths: &[u32]) -> Result<Vec<Vec<u8>>> {
    let mut pos = 0;
    let n_reads = read_varint(payload, &mut pos)? as usize;
    if n_reads != lengths.len() {
        return Err(FqcError::format(format!(
            "abc payload stores {n_reads} reads but aux declares {}",
            lengths.len()
        )));
    }
    let coded_len = read_varint(payload, &mut pos)? as usize;
    let end = pos
        .checked_add(coded_len)
        .filter(|&e| e <= payload.len())
        .ok_or_else(|| FqcError::format("truncated abc payload"))?;
    let coded = &payload[pos..end];

    let mut dec = RangeDecoder::new(coded);
    let mut models = Models::new();
    let mut contig = Contig::new();
    let mut prev_offset = 0usize;
    let mut out = Vec::with_capacity(n_reads);

    for (i, &len) in lengths.iter().enumerate() {
        let len = len as usize;
        if len > super::CONSENSUS_CAP {
            return Err(FqcError::format(format!(
                "read length {len} implausible for the short-read codec"
            )));
        }
        let new_contig = models.flag.decode(&mut dec) == 1;

        let (stored, offset, reverse) = if new_contig {
            let stored: Vec<u8> = (0..len)
                .map(|_| models.literal.decode(&mut dec) as u8)
                .collect();
            contig.reset();
            (stored, 0usize, false)
        } else {
            let reverse = models.orient.decode(&mut dec) == 1;
            let delta = decode_varint(&mut dec, &mut models.shift) as usize;
            let offset = prev_offset + delta;
            if offset > contig.len() {
                return Err(FqcError::format(format!(
                    "abc shift beyond consensus at read {i}"
                )));
            }
            let overlap = (contig.len() - offset).min(len);
            let mut stored: Vec<u8> = (0..overlap)
                .map(|p| contig.reference(offset + p))
                .collect();

            let n_mismatches = decode_varint(&mut dec, &mut models.mismatch_count) as usize;
            let mut p = 0usize;
            for m in 0..n_mismatches {
                let gap = decode_varint(&mut dec, &mut models.mismatch_gap) as usize;
                p = if m == 0 { gap } else { p + gap };
                if p >= overlap {
                    return Err(FqcError::format(format!(
                        "abc substitution beyond overlap at read {i}"
                    )));
                }
                let ref_code = contig.reference(offset + p) as usize;
                stored[p] = models.subst[ref_code].decode(&mut dec) as u8;
            }
            for _ in overlap..len {
                stored.push(models.literal.decode(&mut dec) as u8);
            }
            (stored, offset, reverse)
        };

        contig.absorb(offset, &stored);
        prev_offset = offset;

        let codes = if reverse {
            revcomp_codes(&stored)
        } else {
            stored
        };
        let mut seq = codes_to_seq(&codes);

        let n_count = decode_varint(&mut dec, &mut models.n_count) as usize;
        if n_count > len {
            return Err(FqcError::format(format!(
                "abc N-count {n_count} exceeds read length at read {i}"
            )));
        }
        let mut n_positions = Vec::with_capacity(n_count);
        let mut prev_n = 0u32;
        for m in 0..n_count {
            let gap = decode_varint(&mut dec, &mut models.n_gap) as u32;
            prev_n = if m == 0 { gap } else { prev_n + gap };
            n_positions.push(prev_n);
        }
        apply_n_positions(&mut seq, &n_positions)?;
        out.push(seq);
    }

    Ok(out)
}
