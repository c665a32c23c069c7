//! Assembly-based compression for SHORT sequences.
//!
//! Reads arrive in archive order, which the global analyzer has already
//! arranged so that neighbors tend to come from overlapping genome
//! positions. The encoder threads them onto *contigs*: a growing consensus
//! with per-position base counts. Each read is aligned to the live
//! consensus at a small shift from its predecessor; the stored form is the
//! shift, an orientation bit, the substitutions against the consensus in
//! the overlapped region, and literal bases where the read extends past
//! the consensus end. A read that fits nowhere starts a fresh contig and
//! is stored fully literal.
//!
//! Everything is coded arithmetically on a single stream under distinct
//! adaptive models (flags, orientation, shifts, substitution positions,
//! substituted bases per reference base, literals, N-mask). The decoder
//! replays the identical consensus bookkeeping: both sides mutate the
//! same [`Contig`] type with the same update routine, so divergence is a
//! type-system-level impossibility rather than a tested property.
//!
//! `N` cannot live in the 2-bit domain: reads are matched with `N → A`
//! and an explicit per-read N-position stream restores them after
//! reconstruction.

mod decode;
mod encode;

pub use decode::decode;
pub use encode::encode;

use crate::rangecoder::AdaptiveModel;

/// Maximum substitutions tolerated in the overlapped region before a read
/// starts a new contig.
pub(crate) const THRESH_ACCEPT: u32 = 4;

/// How far past the previous read's shift the encoder searches.
pub(crate) const MAX_SHIFT_SEARCH: usize = 32;

/// Consensus length bound; a contig that would outgrow it is closed.
pub(crate) const CONSENSUS_CAP: usize = 1 << 20;

// ---------------------------------------------------------------------------
// Contig
// ---------------------------------------------------------------------------

/// The live consensus: per-position base counts plus the cached majority
/// base. Shared verbatim between encode and decode.
pub(crate) struct Contig {
    counts: Vec<[u32; 4]>,
    refs: Vec<u8>,
}

impl Contig {
    pub(crate) fn new() -> Self {
        Contig {
            counts: Vec::new(),
            refs: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.refs.len()
    }

    #[inline]
    pub(crate) fn reference(&self, pos: usize) -> u8 {
        self.refs[pos]
    }

    pub(crate) fn reset(&mut self) {
        self.counts.clear();
        self.refs.clear();
    }

    /// Fold a read (already in stored orientation) into the consensus at
    /// `offset`. `offset` never exceeds the current length, so growth is
    /// strictly by appending.
    pub(crate) fn absorb(&mut self, offset: usize, codes: &[u8]) {
        debug_assert!(offset <= self.len());
        for (p, &code) in codes.iter().enumerate() {
            let pos = offset + p;
            if pos == self.counts.len() {
                self.counts.push([0; 4]);
                self.refs.push(code);
            }
            let cell = &mut self.counts[pos];
            cell[code as usize] += 1;
            // Majority base, ties to the lowest code.
            let mut best = 0u8;
            for c in 1..4u8 {
                if cell[c as usize] > cell[best as usize] {
                    best = c;
                }
            }
            self.refs[pos] = best;
        }
    }
}

// ---------------------------------------------------------------------------
// Model bank
// ---------------------------------------------------------------------------

/// The fixed set of models both sides instantiate identically per block.
pub(crate) struct Models {
    /// 1 = the read starts a new contig.
    pub(crate) flag: AdaptiveModel,
    /// 1 = stored reverse-complemented.
    pub(crate) orient: AdaptiveModel,
    /// Varint bytes of the shift delta from the previous read's offset.
    pub(crate) shift: AdaptiveModel,
    /// Varint bytes of the substitution count.
    pub(crate) mismatch_count: AdaptiveModel,
    /// Varint bytes of substitution position gaps.
    pub(crate) mismatch_gap: AdaptiveModel,
    /// Substituted base, one model per consensus reference base.
    pub(crate) subst: [AdaptiveModel; 4],
    /// Literal bases (new contigs and extensions).
    pub(crate) literal: AdaptiveModel,
    /// Varint bytes of the per-read N count.
    pub(crate) n_count: AdaptiveModel,
    /// Varint bytes of N position gaps.
    pub(crate) n_gap: AdaptiveModel,
}

impl Models {
    pub(crate) fn new() -> Self {
        let byte = || AdaptiveModel::new(256);
        let base = || AdaptiveModel::new(4);
        Models {
            flag: AdaptiveModel::new(2),
            orient: AdaptiveModel::new(2),
            shift: byte(),
            mismatch_count: byte(),
            mismatch_gap: byte(),
            subst: [base(), base(), base(), base()],
            literal: base(),
            n_count: byte(),
            n_gap: byte(),
        }
    }
}
