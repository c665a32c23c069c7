//! The original-order ↔ archive-order bijection.
//!
//! Two permutation arrays of length `N`: `forward[original_id] =
//! archive_id` and `reverse[archive_id] = original_id`. Both are stored
//! (the decoder wants O(1) lookups in either direction without an
//! inversion pass), delta-coded as a raw first value followed by signed
//! varint deltas. Loading verifies that the two compose to the identity;
//! a mismatch means the archive is corrupt, not merely stale.

use crate::error::{FqcError, Result};
use crate::varint::{read_signed_varint, read_varint, write_signed_varint, write_varint};

/// Serialization version of the map section.
pub const REORDER_MAP_VERSION: u32 = 1;

/// Fixed header: `header_size u32 ∥ version u32 ∥ total_reads u64 ∥
/// forward_size u64 ∥ reverse_size u64`.
pub const REORDER_MAP_HEADER_SIZE: u32 = 32;

/// The bidirectional permutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReorderMap {
    forward: Vec<u64>,
    reverse: Vec<u64>,
}

impl ReorderMap {
    /// Build from `reverse[archive_id] = original_id`, deriving `forward`
    /// and validating that `reverse` is a permutation.
    pub fn from_reverse(reverse: Vec<u64>) -> Result<Self> {
        let n = reverse.len();
        let mut forward = vec![u64::MAX; n];
        for (archive_id, &original_id) in reverse.iter().enumerate() {
            let slot = forward.get_mut(original_id as usize).ok_or_else(|| {
                FqcError::Internal(format!(
                    "reorder map original id {original_id} out of range {n}"
                ))
            })?;
            if *slot != u64::MAX {
                return Err(FqcError::Internal(format!(
                    "reorder map original id {original_id} appears twice"
                )));
            }
            *slot = archive_id as u64;
        }
        Ok(ReorderMap { forward, reverse })
    }

    /// Identity map of length `n` (used when reordering found nothing to do
    /// but a map was requested).
    pub fn identity(n: u64) -> Self {
        let v: Vec<u64> = (0..n).collect();
        ReorderMap {
            forward: v.clone(),
            reverse: v,
        }
    }

    pub fn len(&self) -> u64 {
        self.forward.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// `original_id → archive_id`.
    #[inline]
    pub fn forward(&self, original_id: u64) -> u64 {
        self.forward[original_id as usize]
    }

    /// `archive_id → original_id`.
    #[inline]
    pub fn reverse(&self, archive_id: u64) -> u64 {
        self.reverse[archive_id as usize]
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    fn encode_permutation(values: &[u64]) -> Vec<u8> {
        let mut out = Vec::with_capacity(values.len() * 2);
        let mut prev = 0u64;
        for (i, &v) in values.iter().enumerate() {
            if i == 0 {
                write_varint(&mut out, v);
            } else {
                write_signed_varint(&mut out, v.wrapping_sub(prev) as i64);
            }
            prev = v;
        }
        out
    }

    fn decode_permutation(buf: &[u8], n: usize) -> Result<Vec<u64>> {
        // Every value occupies at least one byte, so a count beyond the
        // buffer length is corruption, not a huge allocation.
        if n > buf.len() {
            return Err(FqcError::format("reorder map shorter than its read count"));
        }
        let mut pos = 0;
        let mut values = Vec::with_capacity(n);
        let mut prev = 0u64;
        for i in 0..n {
            let v = if i == 0 {
                read_varint(buf, &mut pos)?
            } else {
                let delta = read_signed_varint(buf, &mut pos)?;
                let (next, overflow) = if delta >= 0 {
                    prev.overflowing_add(delta as u64)
                } else {
                    prev.overflowing_sub(delta.unsigned_abs())
                };
                if overflow {
                    return Err(FqcError::format("reorder map delta out of range"));
                }
                next
            };
            values.push(v);
            prev = v;
        }
        if pos != buf.len() {
            return Err(FqcError::format("trailing bytes in reorder map stream"));
        }
        Ok(values)
    }

    /// Serialize the full map section.
    pub fn serialize(&self) -> Vec<u8> {
        let forward_bytes = Self::encode_permutation(&self.forward);
        let reverse_bytes = Self::encode_permutation(&self.reverse);
        let mut out =
            Vec::with_capacity(REORDER_MAP_HEADER_SIZE as usize + forward_bytes.len() + reverse_bytes.len());
        out.extend_from_slice(&REORDER_MAP_HEADER_SIZE.to_le_bytes());
        out.extend_from_slice(&REORDER_MAP_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.len()).to_le_bytes());
        out.extend_from_slice(&(forward_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&(reverse_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&forward_bytes);
        out.extend_from_slice(&reverse_bytes);
        out
    }

    /// Deserialize and verify `forward ∘ reverse = id`.
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < REORDER_MAP_HEADER_SIZE as usize {
            return Err(FqcError::format("truncated reorder map header"));
        }
        let header_size = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if header_size < REORDER_MAP_HEADER_SIZE {
            return Err(FqcError::format("reorder map header too small"));
        }
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version > REORDER_MAP_VERSION {
            return Err(FqcError::format(format!(
                "reorder map version {version} newer than supported"
            )));
        }
        let total_reads = u64::from_le_bytes(buf[8..16].try_into().unwrap()) as usize;
        let forward_size = u64::from_le_bytes(buf[16..24].try_into().unwrap()) as usize;
        let reverse_size = u64::from_le_bytes(buf[24..32].try_into().unwrap()) as usize;

        // Unknown trailing header bytes are skipped for forward compatibility.
        let body = buf
            .get(header_size as usize..)
            .ok_or_else(|| FqcError::format("truncated reorder map"))?;
        if body.len() != forward_size + reverse_size {
            return Err(FqcError::format("reorder map body size mismatch"));
        }
        let forward = Self::decode_permutation(&body[..forward_size], total_reads)?;
        let reverse = Self::decode_permutation(&body[forward_size..], total_reads)?;

        let map = ReorderMap { forward, reverse };
        map.verify()?;
        Ok(map)
    }

    /// Check both composition directions.
    pub fn verify(&self) -> Result<()> {
        let n = self.forward.len();
        if self.reverse.len() != n {
            return Err(FqcError::format("reorder map halves differ in length"));
        }
        for (i, &a) in self.forward.iter().enumerate() {
            let back = self
                .reverse
                .get(a as usize)
                .ok_or_else(|| FqcError::format("reorder map forward value out of range"))?;
            if *back as usize != i {
                return Err(FqcError::format(format!(
                    "reorder map is not a bijection at original id {i}"
                )));
            }
        }
        for (i, &o) in self.reverse.iter().enumerate() {
            let fwd = self
                .forward
                .get(o as usize)
                .ok_or_else(|| FqcError::format("reorder map reverse value out of range"))?;
            if *fwd as usize != i {
                return Err(FqcError::format(format!(
                    "reorder map is not a bijection at archive id {i}"
                )));
            }
        }
        Ok(())
    }
}
