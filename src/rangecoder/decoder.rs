//! Decoding half of the arithmetic coder.

use super::bitio::BitReader;
use super::{CODE_BITS, FIRST_QUARTER, HALF, THIRD_QUARTER, TOP};

/// Arithmetic decoder over a byte slice. Mirrors [`super::RangeEncoder`]
/// operation for operation; the caller drives it through a model's search
/// ([`super::AdaptiveModel::decode`]).
pub struct RangeDecoder<'a> {
    low: u64,
    high: u64,
    code: u64,
    bits: BitReader<'a>,
}

impl<'a> RangeDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        let mut bits = BitReader::new(buf);
        let mut code = 0u64;
        for _ in 0..CODE_BITS {
            code = (code << 1) | bits.pull();
        }
        RangeDecoder {
            low: 0,
            high: TOP,
            code,
            bits,
        }
    }

    /// Cumulative-frequency target of the next symbol under a model with
    /// the given `total`. The caller locates the symbol whose cumulative
    /// span contains the target, then calls [`RangeDecoder::consume`].
    #[inline]
    pub fn decode_target(&self, total: u32) -> u32 {
        let range = self.high - self.low + 1;
        (((self.code - self.low + 1) * u64::from(total) - 1) / range) as u32
    }

    /// Narrow the interval exactly as the encoder did for this symbol, then
    /// renormalize, pulling fresh bits into the code register.
    pub fn consume(&mut self, cum_low: u32, cum_high: u32, total: u32) {
        debug_assert!(cum_low < cum_high && cum_high <= total);
        let range = self.high - self.low + 1;
        self.high = self.low + range * u64::from(cum_high) / u64::from(total) - 1;
        self.low += range * u64::from(cum_low) / u64::from(total);

        loop {
            if self.high < HALF {
                // nothing to subtract
            } else if self.low >= HALF {
                self.low -= HALF;
                self.high -= HALF;
                self.code -= HALF;
            } else if self.low >= FIRST_QUARTER && self.high < THIRD_QUARTER {
                self.low -= FIRST_QUARTER;
                self.high -= FIRST_QUARTER;
                self.code -= FIRST_QUARTER;
            } else {
                break;
            }
            self.low <<= 1;
            self.high = (self.high << 1) | 1;
            self.code = (self.code << 1) | self.bits.pull();
        }
    }
}
