//! ABC encoding: align each read to the live consensus, emit the delta.

use crate::basepack::{revcomp_codes, seq_to_codes, split_n_positions};
use crate::error::Result;
use crate::rangecoder::model::encode_varint;
use crate::rangecoder::RangeEncoder;
use crate::varint::write_varint;

use super::{Contig, Models, CONSENSUS_CAP, MAX_SHIFT_SEARCH, THRESH_ACCEPT};

/// A candidate placement of a read against the consensus.
struct Alignment {
    offset: usize,
    reverse: bool,
    mismatches: u32,
}

/// Count mismatches of `codes` against the consensus at `offset`, giving
/// up once `limit` is exceeded. Only the overlapped prefix participates;
/// extension bases are literal either way.
fn score(contig: &Contig, offset: usize, codes: &[u8], limit: u32) -> Option<u32> {
    let overlap = contig.len().saturating_sub(offset).min(codes.len());
    let mut mismatches = 0u32;
    for (p, &c) in codes[..overlap].iter().enumerate() {
        if contig.reference(offset + p) != c {
            mismatches += 1;
            if mismatches > limit {
                return None;
            }
        }
    }
    Some(mismatches)
}

/// Search shifts from the previous read's offset forward, forward strand
/// before reverse, first strictly-better score wins. Yields the lowest
/// qualifying shift by construction.
fn align(
    contig: &Contig,
    prev_offset: usize,
    fwd: &[u8],
    rev: &[u8],
) -> Option<Alignment> {
    if fwd.is_empty() || contig.len() == 0 {
        return None;
    }
    let min_overlap = (fwd.len() / 2).max(1);
    let max_shift = contig.len().min(prev_offset + MAX_SHIFT_SEARCH);
    let mut best: Option<Alignment> = None;
    for offset in prev_offset..=max_shift {
        if contig.len().saturating_sub(offset) < min_overlap {
            break;
        }
        for (codes, reverse) in [(fwd, false), (rev, true)] {
            let limit = match &best {
                Some(b) => b.mismatches.saturating_sub(1),
                None => THRESH_ACCEPT,
            };
            if let Some(mismatches) = score(contig, offset, codes, limit) {
                let exact = mismatches == 0;
                best = Some(Alignment {
                    offset,
                    reverse,
                    mismatches,
                });
                if exact {
                    return best;
                }
            }
        }
    }
    best
}

/// Encode a block of sequences (ASCII over `{A,C,G,T,N}`) into the ABC
/// payload: `varint read_count ∥ varint coded_len ∥ coded bytes`.
pub fn encode(seqs: &[&[u8]]) -> Result<Vec<u8>> {
    let mut enc = RangeEncoder::new();
    let mut models = Models::new();
    let mut contig = Contig::new();
    let mut prev_offset = 0usize;

    for seq in seqs {
        let n_positions = split_n_positions(seq);
        let codes = seq_to_codes(seq)?;
        let rev = revcomp_codes(&codes);

        let placement = if contig.len() > CONSENSUS_CAP {
            None
        } else {
            align(&contig, prev_offset, &codes, &rev)
        };

        match placement {
            Some(a) => {
                let stored = if a.reverse { &rev } else { &codes };
                models.flag.encode(&mut enc, 0);
                models.orient.encode(&mut enc, usize::from(a.reverse));
                encode_varint(&mut enc, &mut models.shift, (a.offset - prev_offset) as u64);

                let overlap = contig.len().saturating_sub(a.offset).min(stored.len());
                let mismatches: Vec<usize> = (0..overlap)
                    .filter(|&p| contig.reference(a.offset + p) != stored[p])
                    .collect();
                encode_varint(&mut enc, &mut models.mismatch_count, mismatches.len() as u64);
                let mut prev_pos = 0usize;
                for (i, &p) in mismatches.iter().enumerate() {
                    let gap = if i == 0 { p } else { p - prev_pos };
                    encode_varint(&mut enc, &mut models.mismatch_gap, gap as u64);
                    let ref_code = contig.reference(a.offset + p) as usize;
                    models.subst[ref_code].encode(&mut enc, stored[p] as usize);
                    prev_pos = p;
                }
                for &c in &stored[overlap..] {
                    models.literal.encode(&mut enc, c as usize);
                }

                contig.absorb(a.offset, stored);
                prev_offset = a.offset;
            }
            None => {
                models.flag.encode(&mut enc, 1);
                for &c in &codes {
                    models.literal.encode(&mut enc, c as usize);
                }
                contig.reset();
                contig.absorb(0, &codes);
                prev_offset = 0;
            }
        }

        encode_varint(&mut enc, &mut models.n_count, n_positions.len() as u64);
        let mut prev_pos = 0u32;
        for (i, &p) in n_positions.iter().enumerate() {
            let gap = if i == 0 { p } else { p - prev_pos };
            encode_varint(&mut enc, &mut models.n_gap, u64::from(gap));
            prev_pos = p;
        }
    }

    let coded = enc.finish();
    let mut out = Vec::with_capacity(coded.len() + 16);
    write_varint(&mut out, seqs.len() as u64);
    write_varint(&mut out, coded.len() as u64);
    out.extend_from_slice(&coded);
    Ok(out)
}
