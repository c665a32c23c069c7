//! Nucleotide ↔ bit packing.
//!
//! Sequences travel the codecs in a 2-bit domain (`A=0, C=1, G=2, T=3`);
//! `N` cannot be represented there, so callers extract an N-position mask
//! first ([`split_n_positions`]) and restore it after reconstruction. The
//! 3-bit packing exists for encoder-side bitsets that must distinguish `N`
//! without a sidecar mask.

use crate::error::{FqcError, Result};

/// 2-bit code for an ASCII base. `N` maps to `A`; anything outside
/// `{A,C,G,T,N}` is a format error (FASTQ parsing validates earlier, this
/// guards internal misuse).
#[inline]
pub fn base_to_code(base: u8) -> Result<u8> {
    match base {
        b'A' | b'N' => Ok(0),
        b'C' => Ok(1),
        b'G' => Ok(2),
        b'T' => Ok(3),
        other => Err(FqcError::format(format!(
            "invalid base byte 0x{other:02X}"
        ))),
    }
}

/// ASCII base for a 2-bit code. Codes are produced internally, so out-of-
/// range input is a bug, not bad data.
#[inline]
pub fn code_to_base(code: u8) -> u8 {
    const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];
    BASES[(code & 3) as usize]
}

/// Complement of a 2-bit code (A↔T, C↔G).
#[inline]
pub fn complement_code(code: u8) -> u8 {
    3 - (code & 3)
}

/// Convert an ASCII sequence into 2-bit codes, one per byte.
pub fn seq_to_codes(seq: &[u8]) -> Result<Vec<u8>> {
    seq.iter().map(|&b| base_to_code(b)).collect()
}

/// Convert 2-bit codes back to an ASCII sequence.
pub fn codes_to_seq(codes: &[u8]) -> Vec<u8> {
    codes.iter().map(|&c| code_to_base(c)).collect()
}

/// Reverse-complement a slice of 2-bit codes in place order (returns a new
/// vector).
pub fn revcomp_codes(codes: &[u8]) -> Vec<u8> {
    codes.iter().rev().map(|&c| complement_code(c)).collect()
}

/// Extract positions of `N` bytes from `seq`. Returned positions are in
/// read coordinates; the sequence itself is left untouched (its `N`s encode
/// as `A` in the 2-bit domain).
pub fn split_n_positions(seq: &[u8]) -> Vec<u32> {
    seq.iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'N')
        .map(|(i, _)| i as u32)
        .collect()
}

/// Overwrite the bytes at `positions` with `N`.
pub fn apply_n_positions(seq: &mut [u8], positions: &[u32]) -> Result<()> {
    for &p in positions {
        let slot = seq
            .get_mut(p as usize)
            .ok_or_else(|| FqcError::format("N position beyond read length"))?;
        *slot = b'N';
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Word-packed forms
// ---------------------------------------------------------------------------

/// Pack 2-bit codes into little-endian `u64` words, 32 bases per word.
/// The word count is `ceil(len / 32)`; trailing bits are zero.
pub fn pack_codes_2bit(codes: &[u8]) -> Vec<u64> {
    let mut words = vec![0u64; codes.len().div_ceil(32)];
    for (i, &c) in codes.iter().enumerate() {
        words[i / 32] |= ((c & 3) as u64) << ((i % 32) * 2);
    }
    words
}

/// Unpack `len` bases from 2-bit packed words.
pub fn unpack_codes_2bit(words: &[u64], len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((words[i / 32] >> ((i % 32) * 2)) & 3) as u8)
        .collect()
}

/// Hamming distance between two equal-length packed 2-bit sequences,
/// counted in bases. XOR makes differing bases produce a nonzero 2-bit
/// lane; folding the two lane bits collapses each base to one counted bit.
pub fn hamming_packed(a: &[u64], b: &[u64], len: usize) -> u32 {
    debug_assert!(a.len() >= len.div_ceil(32) && b.len() >= len.div_ceil(32));
    const LOW_LANES: u64 = 0x5555_5555_5555_5555;
    let mut dist = 0u32;
    let full_words = len / 32;
    for w in 0..full_words {
        let x = a[w] ^ b[w];
        dist += ((x | (x >> 1)) & LOW_LANES).count_ones();
    }
    let rem = len % 32;
    if rem > 0 {
        let mask = (1u64 << (rem * 2)) - 1;
        let x = (a[full_words] ^ b[full_words]) & mask;
        dist += ((x | (x >> 1)) & LOW_LANES).count_ones();
    }
    dist
}

/// Hamming distance between `a[shift..shift+len]` and `b[..len]`, both in
/// packed form, giving up once `limit` is exceeded. The shifted view of
/// `a` is assembled word by word, so no temporary buffer is needed.
pub fn hamming_packed_shifted(
    a: &[u64],
    shift: usize,
    b: &[u64],
    len: usize,
    limit: u32,
) -> Option<u32> {
    const LOW_LANES: u64 = 0x5555_5555_5555_5555;
    let word = shift / 32;
    let bit = (shift % 32) * 2;
    if bit == 0 {
        let dist = hamming_packed(&a[word..], b, len);
        return (dist <= limit).then_some(dist);
    }
    let mut dist = 0u32;
    let words = len.div_ceil(32);
    for w in 0..words {
        let lo = a.get(word + w).copied().unwrap_or(0) >> bit;
        let hi = a.get(word + w + 1).copied().unwrap_or(0) << (64 - bit);
        let mut x = (lo | hi) ^ b[w];
        if w == words - 1 && len % 32 != 0 {
            x &= (1u64 << ((len % 32) * 2)) - 1;
        }
        dist += ((x | (x >> 1)) & LOW_LANES).count_ones();
        if dist > limit {
            return None;
        }
    }
    (dist <= limit).then_some(dist)
}

/// Pack codes of the 5-letter alphabet (`A,C,G,T,N` = 0..=4) at 3 bits per
/// symbol into little-endian `u64` words, 21 symbols per word.
pub fn pack_codes_3bit(seq: &[u8]) -> Result<Vec<u64>> {
    let mut words = vec![0u64; seq.len().div_ceil(21)];
    for (i, &b) in seq.iter().enumerate() {
        let code: u64 = match b {
            b'A' => 0,
            b'C' => 1,
            b'G' => 2,
            b'T' => 3,
            b'N' => 4,
            other => {
                return Err(FqcError::format(format!(
                    "invalid base byte 0x{other:02X}"
                )))
            }
        };
        words[i / 21] |= code << ((i % 21) * 3);
    }
    Ok(words)
}

/// Unpack `len` symbols from 3-bit packed words back to ASCII.
pub fn unpack_codes_3bit(words: &[u64], len: usize) -> Result<Vec<u8>> {
    const BASES: [u8; 5] = [b'A', b'C', b'G', b'T', b'N'];
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let code = ((words[i / 21] >> ((i % 21) * 3)) & 7) as usize;
        let base = *BASES
            .get(code)
            .ok_or_else(|| FqcError::format("invalid 3-bit base code"))?;
        out.push(base);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        let seq = b"ACGTACGTTTGA";
        let codes = seq_to_codes(seq).unwrap();
        assert_eq!(codes_to_seq(&codes), seq);
    }

    #[test]
    fn n_maps_to_a_with_mask() {
        let seq = b"ACNNTA";
        let mask = split_n_positions(seq);
        assert_eq!(mask, vec![2, 3]);
        let codes = seq_to_codes(seq).unwrap();
        let mut restored = codes_to_seq(&codes);
        assert_eq!(restored, b"ACAATA");
        apply_n_positions(&mut restored, &mask).unwrap();
        assert_eq!(restored, seq);
    }

    #[test]
    fn revcomp_is_self_inverse() {
        let codes = seq_to_codes(b"ACGGTTAC").unwrap();
        assert_eq!(revcomp_codes(&revcomp_codes(&codes)), codes);
        assert_eq!(codes_to_seq(&revcomp_codes(&codes)), b"GTAACCGT");
    }

    #[test]
    fn pack_2bit_round_trip_across_word_boundary() {
        let seq: Vec<u8> = (0..100).map(|i| code_to_base(i % 4)).collect();
        let codes = seq_to_codes(&seq).unwrap();
        let words = pack_codes_2bit(&codes);
        assert_eq!(words.len(), 4);
        assert_eq!(unpack_codes_2bit(&words, 100), codes);
    }

    #[test]
    fn hamming_counts_bases_not_bits() {
        let a = seq_to_codes(b"AAAAAAAA").unwrap();
        let mut b = a.clone();
        b[0] = 3; // T differs from A by two bits, one base
        b[7] = 1; // C differs from A by one bit, one base
        let (pa, pb) = (pack_codes_2bit(&a), pack_codes_2bit(&b));
        assert_eq!(hamming_packed(&pa, &pb, 8), 2);
        assert_eq!(hamming_packed(&pa, &pa, 8), 0);
    }

    #[test]
    fn shifted_hamming_matches_byte_comparison() {
        let a = seq_to_codes(b"ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT").unwrap();
        let b: Vec<u8> = a[5..].iter().copied().chain([0, 1, 2, 0, 3]).collect();
        let (pa, pb) = (pack_codes_2bit(&a), pack_codes_2bit(&b));
        for shift in 0..=8usize {
            let overlap = a.len() - shift;
            let expected: u32 = (0..overlap.min(b.len()))
                .filter(|&p| a[shift + p] != b[p])
                .count() as u32;
            let got = hamming_packed_shifted(&pa, shift, &pb, overlap.min(b.len()), u32::MAX);
            assert_eq!(got, Some(expected), "shift {shift}");
        }
        // The shift-5 alignment is exact.
        assert_eq!(
            hamming_packed_shifted(&pa, 5, &pb, a.len() - 5, 0),
            Some(0)
        );
        // Limit pruning reports None, never a wrong count.
        assert_eq!(hamming_packed_shifted(&pa, 1, &pb, a.len() - 1, 0), None);
    }

    #[test]
    fn hamming_ignores_tail_beyond_len() {
        let a = pack_codes_2bit(&seq_to_codes(b"ACGT").unwrap());
        let mut b = a.clone();
        // Poison bits beyond the 4-base prefix.
        b[0] |= 0xFF << 8;
        assert_eq!(hamming_packed(&a, &b, 4), 0);
    }

    #[test]
    fn pack_3bit_keeps_n() {
        let seq = b"ACGTNNACGTNNACGTNNACGTN"; // 23 symbols, crosses a word
        let words = pack_codes_3bit(seq).unwrap();
        assert_eq!(unpack_codes_3bit(&words, seq.len()).unwrap(), seq);
    }

    #[test]
    fn invalid_base_rejected() {
        assert!(base_to_code(b'X').is_err());
        assert!(pack_codes_3bit(b"ACGU").is_err());
    }
}
