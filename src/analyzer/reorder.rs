//! Greedy similarity-order construction.
//!
//! An approximate Hamiltonian path through the read-overlap graph: each
//! worker claims an unclaimed seed, then repeatedly queries the minimizer
//! dictionaries for an unclaimed read within [`THRESH_REORDER`] of the
//! current consensus, adopts the best candidate (lowest distance, then
//! lowest shift, then lowest read id), and slides the consensus to the
//! adopted read. When the forward direction dries up the consensus is
//! reverse-complemented once; a second failure closes the contig.
//!
//! Claims are optimistic: adoption is a compare-and-set on the read's
//! remaining flag, and a lost race simply counts as a failed search. If
//! the failure fraction over the trailing attempt window passes
//! [`STOP_FRACTION`] the whole pass gives up and the leftovers keep input
//! order; reordering is a compression heuristic, never a correctness
//! requirement.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::basepack::{hamming_packed_shifted, pack_codes_2bit};
use crate::error::{FqcError, Result};
use crate::pipeline::StopToken;

use super::dict::ReorderDicts;

/// Maximum Hamming distance for adoption.
pub const THRESH_REORDER: u32 = 4;

/// Candidates examined per search before giving up.
pub const MAX_SEARCH_REORDER: usize = 1000;

/// Largest consensus shift tried per candidate.
pub const MAX_SHIFT_REORDER: usize = 8;

/// Trailing attempt window for the stop criterion.
pub const STOP_WINDOW: u64 = 1_000_000;

/// Failure fraction over the window that aborts the pass.
pub const STOP_FRACTION: f64 = 0.5;

// ---------------------------------------------------------------------------
// Consensus window
// ---------------------------------------------------------------------------

/// Per-position base counts over the current contig frontier; the
/// reference is the majority base (ties to the lowest code), kept both
/// as byte codes (for the dictionary windows) and word-packed (for the
/// shift-masked distance computation).
struct Consensus {
    counts: Vec<[u32; 4]>,
    refs: Vec<u8>,
    packed: Vec<u64>,
}

impl Consensus {
    fn seed(codes: &[u8]) -> Self {
        let mut c = Consensus {
            counts: Vec::with_capacity(codes.len()),
            refs: Vec::new(),
            packed: Vec::new(),
        };
        c.counts = codes.iter().map(|&b| {
            let mut cell = [0u32; 4];
            cell[b as usize] = 1;
            cell
        }).collect();
        c.rebuild_refs();
        c
    }

    fn rebuild_refs(&mut self) {
        self.refs = self
            .counts
            .iter()
            .map(|cell| {
                let mut best = 0u8;
                for c in 1..4u8 {
                    if cell[c as usize] > cell[best as usize] {
                        best = c;
                    }
                }
                best
            })
            .collect();
        self.packed = pack_codes_2bit(&self.refs);
    }

    fn reference(&self) -> &[u8] {
        &self.refs
    }

    /// Slide the window forward by `shift` and fold in the adopted read.
    fn advance(&mut self, shift: usize, codes: &[u8]) {
        let shift = shift.min(self.counts.len());
        self.counts.drain(..shift);
        self.counts.resize(codes.len(), [0; 4]);
        for (p, &c) in codes.iter().enumerate() {
            self.counts[p][c as usize] += 1;
        }
        self.rebuild_refs();
    }

    /// Flip the window onto the opposite strand.
    fn reverse_complement(&mut self) {
        self.counts.reverse();
        for cell in &mut self.counts {
            cell.swap(0, 3);
            cell.swap(1, 2);
        }
        self.rebuild_refs();
    }
}

// ---------------------------------------------------------------------------
// Candidate scoring
// ---------------------------------------------------------------------------

/// Best placement of a packed candidate against the packed reference over
/// the shift range. Scanning shifts in ascending order with strict
/// improvement yields the lowest qualifying shift.
fn best_shift(
    ref_packed: &[u64],
    ref_len: usize,
    cand_packed: &[u64],
    cand_len: usize,
) -> Option<(u32, usize)> {
    if cand_len == 0 {
        return None;
    }
    let mut best: Option<(u32, usize)> = None;
    for shift in 0..=MAX_SHIFT_REORDER.min(ref_len) {
        let overlap = (ref_len - shift).min(cand_len);
        if overlap < cand_len / 2 || overlap == 0 {
            break;
        }
        let limit = match best {
            Some((d, _)) => d.saturating_sub(1),
            None => THRESH_REORDER,
        };
        if let Some(dist) = hamming_packed_shifted(ref_packed, shift, cand_packed, overlap, limit)
        {
            best = Some((dist, shift));
            if dist == 0 {
                break;
            }
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Greedy pass
// ---------------------------------------------------------------------------

struct Shared<'a> {
    codes: &'a [Vec<u8>],
    packed: Vec<Vec<u64>>,
    dicts: &'a ReorderDicts,
    remaining: Vec<AtomicBool>,
    cursor: AtomicUsize,
    give_up: AtomicBool,
}

impl Shared<'_> {
    fn claim_seed(&self) -> Option<usize> {
        loop {
            let i = self.cursor.fetch_add(1, Ordering::Relaxed);
            if i >= self.codes.len() {
                return None;
            }
            if self.remaining[i]
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(i);
            }
        }
    }

    /// One dictionary search: pick the best matchable unclaimed read and
    /// try to claim it. A lost claim race reports as not-found.
    fn search(&self, cons: &Consensus, buf: &mut Vec<u32>) -> Option<(u32, usize)> {
        self.dicts.candidates(cons.reference(), buf);
        let mut examined = 0usize;
        let mut best: Option<(u32, usize, u32)> = None;
        for &rid in buf.iter() {
            if examined >= MAX_SEARCH_REORDER {
                break;
            }
            if !self.remaining[rid as usize].load(Ordering::Relaxed) {
                continue;
            }
            examined += 1;
            if let Some((dist, shift)) = best_shift(
                &cons.packed,
                cons.refs.len(),
                &self.packed[rid as usize],
                self.codes[rid as usize].len(),
            ) {
                let key = (dist, shift, rid);
                if best.map_or(true, |b| key < b) {
                    best = Some(key);
                }
            }
        }
        let (_, shift, rid) = best?;
        self.remaining[rid as usize]
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
            .ok()
            .map(|_| (rid, shift))
    }
}

/// Compute a similarity order over `codes` (2-bit sequences). The result
/// is a permutation: `order[archive_position] = original_index`.
pub fn greedy_order(
    codes: &[Vec<u8>],
    threads: usize,
    stop: &StopToken,
) -> Result<Vec<u32>> {
    let n = codes.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let dicts = ReorderDicts::build(codes);
    let shared = Shared {
        codes,
        packed: codes.iter().map(|c| pack_codes_2bit(c)).collect(),
        dicts: &dicts,
        remaining: (0..n).map(|_| AtomicBool::new(true)).collect(),
        cursor: AtomicUsize::new(0),
        give_up: AtomicBool::new(false),
    };
    let chains: Mutex<Vec<Vec<u32>>> = Mutex::new(Vec::new());

    rayon::scope(|scope| {
        for _ in 0..threads.max(1) {
            scope.spawn(|_| {
                let mut chain: Vec<u32> = Vec::new();
                let mut buf: Vec<u32> = Vec::new();
                let mut attempts = 0u64;
                let mut failures = 0u64;

                while !stop.is_stopped() && !shared.give_up.load(Ordering::Relaxed) {
                    let seed = match shared.claim_seed() {
                        Some(s) => s,
                        None => break,
                    };
                    chain.push(seed as u32);
                    let mut cons = Consensus::seed(&shared.codes[seed]);
                    let mut reversed = false;

                    loop {
                        if stop.is_stopped() || shared.give_up.load(Ordering::Relaxed) {
                            break;
                        }
                        attempts += 1;
                        match shared.search(&cons, &mut buf) {
                            Some((rid, shift)) => {
                                chain.push(rid);
                                cons.advance(shift, &shared.codes[rid as usize]);
                            }
                            None => {
                                failures += 1;
                                if reversed {
                                    break;
                                }
                                reversed = true;
                                cons.reverse_complement();
                            }
                        }
                        if attempts >= STOP_WINDOW {
                            if failures as f64 / attempts as f64 > STOP_FRACTION {
                                shared.give_up.store(true, Ordering::Relaxed);
                            }
                            attempts = 0;
                            failures = 0;
                        }
                    }
                }
                chains.lock().unwrap().push(chain);
            });
        }
    });

    if stop.is_stopped() {
        return Err(FqcError::Cancelled);
    }

    let mut order: Vec<u32> = Vec::with_capacity(n);
    for chain in chains.into_inner().unwrap() {
        order.extend_from_slice(&chain);
    }
    // Leftovers (give-up, claim races lost on both sides) keep input order.
    for (i, flag) in shared.remaining.iter().enumerate() {
        if flag.load(Ordering::Relaxed) {
            order.push(i as u32);
        }
    }
    debug_assert_eq!(order.len(), n);
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth(seed: u64, len: usize) -> Vec<u8> {
        let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                (x & 3) as u8
            })
            .collect()
    }

    fn is_permutation(order: &[u32], n: usize) {
        let mut seen = vec![false; n];
        for &i in order {
            assert!(!seen[i as usize], "duplicate {i}");
            seen[i as usize] = true;
        }
        assert_eq!(order.len(), n);
    }

    #[test]
    fn order_is_a_permutation() {
        let genome = synth(1, 5000);
        let codes: Vec<Vec<u8>> =
            (0..400).map(|i| genome[(i * 37) % 4800..(i * 37) % 4800 + 100].to_vec()).collect();
        let order = greedy_order(&codes, 4, &StopToken::new()).unwrap();
        is_permutation(&order, codes.len());
    }

    #[test]
    fn overlapping_reads_end_up_adjacent() {
        // Reads tiling one genome window: a good order should place many
        // overlapping pairs next to each other. Demand substantially more
        // adjacency than the scattered input order has.
        let genome = synth(2, 3000);
        let codes: Vec<Vec<u8>> = (0..500)
            .map(|i| {
                let start = (i * 613) % 2900; // scattered tiling
                genome[start..start + 100].to_vec()
            })
            .collect();
        let order = greedy_order(&codes, 2, &StopToken::new()).unwrap();
        is_permutation(&order, codes.len());

        let packed: Vec<Vec<u64>> = codes.iter().map(|c| pack_codes_2bit(c)).collect();
        let adjacency = |seq: &[u32]| -> usize {
            seq.windows(2)
                .filter(|w| {
                    best_shift(
                        &packed[w[0] as usize],
                        codes[w[0] as usize].len(),
                        &packed[w[1] as usize],
                        codes[w[1] as usize].len(),
                    )
                    .is_some()
                })
                .count()
        };
        let input: Vec<u32> = (0..codes.len() as u32).collect();
        assert!(
            adjacency(&order) >= adjacency(&input),
            "reorder did not improve adjacency"
        );
    }

    #[test]
    fn single_thread_and_empty_inputs() {
        assert!(greedy_order(&[], 1, &StopToken::new()).unwrap().is_empty());
        let codes = vec![synth(3, 100)];
        assert_eq!(greedy_order(&codes, 1, &StopToken::new()).unwrap(), vec![0]);
    }

    #[test]
    fn cancellation_is_surfaced() {
        let stop = StopToken::new();
        stop.stop();
        let codes: Vec<Vec<u8>> = (0..10).map(|i| synth(i, 100)).collect();
        assert!(matches!(
            greedy_order(&codes, 2, &stop),
            Err(FqcError::Cancelled)
        ));
    }

    #[test]
    fn best_shift_prefers_low_distance_then_low_shift() {
        let reference = synth(9, 100);
        let rp = pack_codes_2bit(&reference);
        // Exact copy at shift 0.
        assert_eq!(best_shift(&rp, 100, &rp, 100), Some((0, 0)));
        // Shifted copy: detected at its true shift.
        let mut shifted = reference[4..].to_vec();
        shifted.extend_from_slice(&[0, 1, 2, 3]);
        let sp = pack_codes_2bit(&shifted);
        let (dist, shift) = best_shift(&rp, 100, &sp, 100).unwrap();
        assert_eq!(shift, 4);
        assert!(dist <= THRESH_REORDER);
        // Unrelated read: no placement.
        let other = synth(77, 100);
        assert_eq!(best_shift(&rp, 100, &pack_codes_2bit(&other), 100), None);
    }
}
