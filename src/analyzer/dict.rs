//! Minimizer dictionaries for the reordering search.
//!
//! Each dictionary indexes one positional window of every read by the
//! window's canonical minimizer. Two staggered windows give the search a
//! chance to find neighbors that overlap either end of the current
//! consensus. Buckets live in lock-striped hash maps so construction can
//! run fully parallel: the stripe is selected by the masked key hash, and
//! insertions into different stripes never contend.

use std::collections::HashMap;
use std::sync::Mutex;

use rayon::prelude::*;

use crate::xxhash::xxh64_oneshot;

use super::minimizer::minimizer;

/// Number of staggered dictionaries.
pub const NUM_DICT_REORDER: usize = 2;

/// Lock stripes per dictionary. The stripe index is the masked key hash.
pub const DICT_STRIPES: usize = 1 << 12;

/// Positional window of dictionary `d` for a read of length `len`.
pub fn window_bounds(len: usize, d: usize) -> (usize, usize) {
    match d {
        0 => (0, len * 2 / 3),
        _ => (len / 3, len),
    }
}

#[inline]
fn stripe_of(key: u64) -> usize {
    (xxh64_oneshot(&key.to_le_bytes(), 0) & (DICT_STRIPES as u64 - 1)) as usize
}

/// One lock-striped minimizer index.
pub struct Dict {
    stripes: Vec<Mutex<HashMap<u64, Vec<u32>>>>,
}

impl Dict {
    fn new() -> Self {
        Dict {
            stripes: (0..DICT_STRIPES).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn insert(&self, key: u64, rid: u32) {
        self.stripes[stripe_of(key)]
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push(rid);
    }

    /// Snapshot of the bucket for `key`; empty when absent.
    pub fn bucket(&self, key: u64) -> Vec<u32> {
        self.stripes[stripe_of(key)]
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Sort every bucket by read id so candidate examination order (and
    /// therefore the lowest-id tie-break) is deterministic.
    fn sort_buckets(&mut self) {
        self.stripes.par_iter_mut().for_each(|stripe| {
            for bucket in stripe.get_mut().unwrap().values_mut() {
                bucket.sort_unstable();
            }
        });
    }
}

/// The full dictionary set over one chunk of reads.
pub struct ReorderDicts {
    dicts: Vec<Dict>,
}

impl ReorderDicts {
    /// Build all dictionaries over `codes` (2-bit sequences) in parallel.
    pub fn build(codes: &[Vec<u8>]) -> Self {
        let dicts: Vec<Dict> = (0..NUM_DICT_REORDER).map(|_| Dict::new()).collect();
        codes.par_iter().enumerate().for_each(|(rid, read)| {
            for (d, dict) in dicts.iter().enumerate() {
                let (start, end) = window_bounds(read.len(), d);
                if let Some(key) = minimizer(&read[start..end]) {
                    dict.insert(key, rid as u32);
                }
            }
        });
        let mut dicts = dicts;
        for d in &mut dicts {
            d.sort_buckets();
        }
        ReorderDicts { dicts }
    }

    /// Candidate read ids for a reference sequence: the union of bucket
    /// hits across all dictionaries, in (dict, id) order.
    pub fn candidates(&self, reference: &[u8], out: &mut Vec<u32>) {
        out.clear();
        for (d, dict) in self.dicts.iter().enumerate() {
            let (start, end) = window_bounds(reference.len(), d);
            if end <= reference.len() {
                if let Some(key) = minimizer(&reference[start..end]) {
                    out.extend_from_slice(&dict.bucket(key));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basepack::seq_to_codes;

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

    #[test]
    fn windows_are_staggered_and_overlap() {
        let (s0, e0) = window_bounds(99, 0);
        let (s1, e1) = window_bounds(99, 1);
        assert_eq!((s0, e0), (0, 66));
        assert_eq!((s1, e1), (33, 99));
        assert!(s1 < e0, "windows must overlap in the middle");
    }

    #[test]
    fn identical_reads_share_buckets() {
        let read = synth(3, 100);
        let codes = vec![read.clone(), read.clone(), synth(9, 100)];
        let dicts = ReorderDicts::build(&codes);
        let mut hits = Vec::new();
        dicts.candidates(&read, &mut hits);
        assert!(hits.contains(&0) && hits.contains(&1));
    }

    #[test]
    fn overlapping_reads_found_through_either_window() {
        // Plant the globally minimal k-mer (all A) in the region shared by
        // both reads so the shifted neighbor provably lands in the same
        // bucket.
        let mut genome = synth(5, 300);
        for p in 40..56 {
            genome[p] = 0;
        }
        let a = genome[0..100].to_vec();
        let b = genome[4..104].to_vec(); // shifted copy of a
        let dicts = ReorderDicts::build(&[a.clone(), b]);
        let mut hits = Vec::new();
        dicts.candidates(&a, &mut hits);
        assert!(hits.contains(&1), "shifted neighbor not bucketed: {hits:?}");
    }

    #[test]
    fn short_reads_are_skipped_not_panicked() {
        let codes = vec![seq_to_codes(b"ACGT").unwrap()];
        let dicts = ReorderDicts::build(&codes);
        let mut hits = Vec::new();
        dicts.candidates(&codes[0], &mut hits);
        assert!(hits.is_empty());
    }

    #[test]
    fn buckets_are_sorted_by_read_id() {
        let read = synth(7, 80);
        let codes: Vec<Vec<u8>> = (0..50).map(|_| read.clone()).collect();
        let dicts = ReorderDicts::build(&codes);
        let mut hits = Vec::new();
        dicts.candidates(&read, &mut hits);
        let per_dict = &hits[..hits.len() / NUM_DICT_REORDER];
        let mut sorted = per_dict.to_vec();
        sorted.sort_unstable();
        assert_eq!(per_dict, sorted.as_slice());
    }
}
