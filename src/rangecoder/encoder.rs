//! Encoding half of the arithmetic coder.

use super::bitio::BitWriter;
use super::{FIRST_QUARTER, HALF, THIRD_QUARTER, TOP};

/// Arithmetic encoder over a byte vector. One encoder produces one
/// self-contained stream; models are supplied per call so several models
/// can interleave on a single stream.
pub struct RangeEncoder {
    low: u64,
    high: u64,
    /// Underflow counter: bits whose value is known to be the opposite of
    /// the next decided bit.
    pending: u64,
    bits: BitWriter,
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeEncoder {
    pub fn new() -> Self {
        RangeEncoder {
            low: 0,
            high: TOP,
            pending: 0,
            bits: BitWriter::new(),
        }
    }

    #[inline]
    fn emit(&mut self, bit: bool) {
        self.bits.push(bit);
        while self.pending > 0 {
            self.bits.push(!bit);
            self.pending -= 1;
        }
    }

    /// Narrow the interval to the symbol spanning cumulative frequencies
    /// `[cum_low, cum_high)` out of `total`, then renormalize.
    ///
    /// Requires `cum_low < cum_high <= total` and `total` bounded by the
    /// model's frequency cap (far below the quartile width).
    pub fn encode(&mut self, cum_low: u32, cum_high: u32, total: u32) {
        debug_assert!(cum_low < cum_high && cum_high <= total);
        let range = self.high - self.low + 1;
        self.high = self.low + range * u64::from(cum_high) / u64::from(total) - 1;
        self.low += range * u64::from(cum_low) / u64::from(total);

        loop {
            if self.high < HALF {
                self.emit(false);
            } else if self.low >= HALF {
                self.emit(true);
                self.low -= HALF;
                self.high -= HALF;
            } else if self.low >= FIRST_QUARTER && self.high < THIRD_QUARTER {
                self.pending += 1;
                self.low -= FIRST_QUARTER;
                self.high -= FIRST_QUARTER;
            } else {
                break;
            }
            self.low <<= 1;
            self.high = (self.high << 1) | 1;
        }
    }

    /// Flush the final interval disambiguation bits and return the stream.
    pub fn finish(mut self) -> Vec<u8> {
        // One more bit (plus pending underflow bits) pins the interval.
        self.pending += 1;
        let bit = self.low >= FIRST_QUARTER;
        self.emit(bit);
        self.bits.finish()
    }
}
