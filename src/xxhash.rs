//! Thin wrapper around the `xxhash-rust` crate providing the XXH64 API used
//! by the rest of this crate.
//!
//! Only XXH64 is needed: block checksums, the global archive checksum, and
//! dictionary bucket keys all use it. Streaming and one-shot forms hash the
//! same byte sequence to the same digest, so the writer can hash
//! incrementally while a verifier hashes in one pass.

/// Streaming XXH64 state.
pub use xxhash_rust::xxh64::Xxh64 as Xxh64State;

/// Seed for all archive checksums. Changing it is a format break.
pub const CHECKSUM_SEED: u64 = 0;

/// One-shot XXH64 over `data`.
#[inline]
pub fn xxh64_oneshot(data: &[u8], seed: u64) -> u64 {
    xxhash_rust::xxh64::xxh64(data, seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_reference_vector() {
        // Reference XXH64 digest of the empty input with seed 0.
        assert_eq!(xxh64_oneshot(b"", 0), 0xEF46_DB37_54C8_DAE8);
    }

    #[test]
    fn streaming_matches_oneshot() {
        let data = b"GATTACA".repeat(1000);
        let mut st = Xxh64State::new(CHECKSUM_SEED);
        for chunk in data.chunks(37) {
            st.update(chunk);
        }
        assert_eq!(st.digest(), xxh64_oneshot(&data, CHECKSUM_SEED));
    }

    #[test]
    fn seed_changes_digest() {
        assert_ne!(xxh64_oneshot(b"ACGT", 0), xxh64_oneshot(b"ACGT", 1));
    }
}
