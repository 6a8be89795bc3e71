use core::mem::size_of;

/// The register storage shared by the sketch's store variants.
///
/// Registers hold ranks, i.e. the longest run of leading zeros plus one, so
/// a value of 0 means the register has never been touched. Indexing past
/// `count()` panics.
pub trait RegisterStore {
    /// The largest value a register can hold, values above it are clamped.
    const MAX_VALUE: u32;

    /// Creates a new store with `count` registers, all set to zero.
    fn with_count(count: usize) -> Self;

    /// Returns the number of registers.
    fn count(&self) -> usize;

    /// Returns the value of the register at `index`.
    fn get(&self, index: usize) -> u32;

    /// Sets the register at `index` to `value`, clamped to `MAX_VALUE`.
    fn set(&mut self, index: usize, value: u32);

    /// Returns the number of registers set to zero.
    fn zeros(&self) -> usize;

    /// Resets every register to zero, keeping the allocation.
    fn clear(&mut self);

    /// Returns the size of the register buffer in bytes.
    fn size_in_bytes(&self) -> usize;

    #[inline] // Sets the value of the Register at `index` to `value`,
              // if `value` is greater than its current value.
              //
              // Returns whether the register changed.
    fn set_greater(&mut self, index: usize, value: u32) -> bool {
        let value = value.min(Self::MAX_VALUE);

        if value > self.get(index) {
            self.set(index, value);
            true
        } else {
            false
        }
    }

    #[inline] // Returns an iterator that emits Register values.
    fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.count()).map(move |index| self.get(index))
    }
}

/// Registers stored one per `u32` word.
///
/// Values are clamped at 31 like [`PackedRegisters`], so both stores always
/// hold the same logical contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordRegisters {
    // A buffer containing registers.
    buf:   Vec<u32>,
    // The number of registers set to zero.
    zeros: usize,
}

impl RegisterStore for WordRegisters {
    const MAX_VALUE: u32 = 31;

    fn with_count(count: usize) -> WordRegisters {
        WordRegisters {
            buf:   vec![0; count],
            zeros: count,
        }
    }

    #[inline]
    fn count(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    fn get(&self, index: usize) -> u32 {
        self.buf[index]
    }

    #[inline]
    fn set(&mut self, index: usize, value: u32) {
        let value = value.min(Self::MAX_VALUE);

        let cur = self.buf[index];

        self.zeros = adjust_zeros(self.zeros, cur, value);
        self.buf[index] = value;
    }

    #[inline]
    fn zeros(&self) -> usize {
        self.zeros
    }

    fn clear(&mut self) {
        self.buf.fill(0);
        self.zeros = self.buf.len();
    }

    #[inline]
    fn size_in_bytes(&self) -> usize {
        self.buf.len() * size_of::<u32>()
    }
}

/// Registers packed into consecutive 5-bit fields of a byte buffer.
///
/// Register `i` occupies bits `[5 * i, 5 * i + 5)` of the buffer, counting
/// from the least significant bit of the first byte. A field spans at most
/// two adjacent bytes. Ranks above 31 do not fit and are clamped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedRegisters {
    // A buffer containing registers.
    buf:   Vec<u8>,
    // The number of registers stored in buf.
    count: usize,
    // The number of registers set to zero.
    zeros: usize,
}

impl PackedRegisters {
    // The register's size (in bits).
    pub const SIZE: usize = 5;
    // A mask to get the lower register (from LSB).
    const MASK: u16 = (1 << Self::SIZE) - 1;

    #[inline] // Returns the byte holding the first bit of the Register at
              // `index` and the bit offset of the Register within it.
    fn position(index: usize) -> (usize, usize) {
        let bit = index * Self::SIZE;

        (bit / 8, bit % 8)
    }

    #[inline] // Returns the two bytes starting at `byte` as a little endian
              // word. Past the end of the buffer the high byte reads as 0.
    fn window(&self, byte: usize) -> u16 {
        let lo = u16::from(self.buf[byte]);
        let hi = self.buf.get(byte + 1).copied().map_or(0, u16::from);

        lo | (hi << 8)
    }

    /// Returns the number of bytes used by the packed registers.
    #[inline]
    pub fn memory_usage_bytes(&self) -> usize {
        self.buf.len()
    }
}

impl RegisterStore for PackedRegisters {
    const MAX_VALUE: u32 = 31;

    fn with_count(count: usize) -> PackedRegisters {
        PackedRegisters {
            buf:   vec![0; ceil(count * Self::SIZE, 8)],
            count: count,
            zeros: count,
        }
    }

    #[inline]
    fn count(&self) -> usize {
        self.count
    }

    #[inline]
    fn get(&self, index: usize) -> u32 {
        assert!(index < self.count, "register index out of bounds");

        let (byte, shift) = Self::position(index);

        u32::from((self.window(byte) >> shift) & Self::MASK)
    }

    #[inline]
    fn set(&mut self, index: usize, value: u32) {
        assert!(index < self.count, "register index out of bounds");

        let value = value.min(Self::MAX_VALUE);

        let (byte, shift) = Self::position(index);

        let word = self.window(byte);
        let cur = u32::from((word >> shift) & Self::MASK);

        self.zeros = adjust_zeros(self.zeros, cur, value);

        let mask = Self::MASK << shift;
        // `value` fits in 5 bits after clamping.
        let word = (word & !mask) | ((value as u16) << shift);

        self.buf[byte] = word as u8;

        // A field that fits in the last byte never touches the next one.
        if let Some(next) = self.buf.get_mut(byte + 1) {
            *next = (word >> 8) as u8;
        }
    }

    #[inline]
    fn zeros(&self) -> usize {
        self.zeros
    }

    fn clear(&mut self) {
        self.buf.fill(0);
        self.zeros = self.count;
    }

    #[inline]
    fn size_in_bytes(&self) -> usize {
        self.memory_usage_bytes()
    }
}

#[inline] // Returns the zero register count after a register changes from
          // `old` to `new`.
fn adjust_zeros(zeros: usize, old: u32, new: u32) -> usize {
    match (old == 0, new == 0) {
        (true, false) => zeros - 1,
        (false, true) => zeros + 1,
        _ => zeros,
    }
}

// A trait for sharing common HyperLogLog related functionality between
// different register stores.
pub trait HyperLogLogCommon {
    // The asymptotic bias correction constant. Only accurate for 128 or
    // more registers, smaller sketches are biased.
    const ALPHA: f64 = 0.7213;

    #[inline] // Returns the "raw" HyperLogLog estimate as defined by
              // P. Flajolet et al. for a given `precision`.
              //
              // Also returns the count of registers set to 0.
    fn estimate_raw<I>(registers: I, count: usize) -> (f64, usize)
    where
        I: Iterator<Item = u32>,
    {
        let (mut raw, mut zeros) = (0.0, 0);

        for value in registers {
            raw += 1.0 / (1u64 << value) as f64;
            zeros += usize::from(value == 0);
        }

        raw = Self::ALPHA * (count * count) as f64 / raw;

        (raw, zeros)
    }

    #[inline] // Estimates the count of distinct elements using linear
              // counting.
    fn linear_count(count: usize, zeros: usize) -> f64 {
        count as f64 * (count as f64 / zeros as f64).ln()
    }

    #[inline] // Returns the number of registers based on precision.
    fn register_count(precision: u8) -> usize {
        1 << precision
    }
}

#[inline] // Returns the int ceil of num, denom.
pub fn ceil(num: usize, denom: usize) -> usize {
    (num + denom - 1) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_case::test_case;

    struct Estimator;

    impl HyperLogLogCommon for Estimator {}

    #[test]
    fn test_packed_registers_get_set() {
        let mut registers = PackedRegisters::with_count(10);

        assert_eq!(registers.buf.len(), 7);

        registers.set(1, 0b11);

        assert_eq!(registers.buf, vec![0b0110_0000, 0, 0, 0, 0, 0, 0]);

        registers.set(9, 0x1f);

        assert_eq!(registers.buf, vec![0b0110_0000, 0, 0, 0, 0, 0xe0, 0x03]);

        // Register 3 straddles bytes 1 and 2.
        registers.set(3, 0b10101);

        assert_eq!(registers.buf[1], 0b1000_0000);
        assert_eq!(registers.buf[2], 0b0000_1010);

        assert_eq!(registers.get(1), 0b11);
        assert_eq!(registers.get(3), 0b10101);
        assert_eq!(registers.get(9), 0x1f);
        assert_eq!(registers.get(0), 0);
        assert_eq!(registers.get(2), 0);
        assert_eq!(registers.get(4), 0);
    }

    #[test]
    fn test_packed_registers_clamp() {
        let mut registers = PackedRegisters::with_count(16);

        registers.set(5, 32);

        assert_eq!(registers.get(5), 31);
        assert_eq!(registers.get(4), 0);
        assert_eq!(registers.get(6), 0);

        registers.set(6, u32::MAX);

        assert_eq!(registers.get(6), 31);
        assert_eq!(registers.get(5), 31);
        assert_eq!(registers.get(7), 0);
    }

    #[test_case(1; "two registers")]
    #[test_case(2; "four registers")]
    #[test_case(4; "sixteen registers")]
    #[test_case(9; "five hundred twelve registers")]
    fn test_packed_registers_round_trip(precision: u8) {
        let count = Estimator::register_count(precision);

        let mut registers = PackedRegisters::with_count(count);

        for index in 0..count {
            for value in 0..=31 {
                registers.set(index, value);
                assert_eq!(registers.get(index), value);
            }
        }

        // Fill every register with a distinct pattern, then overwrite
        // each one and check no neighbour moved.
        let pattern = |index: usize| (index * 7 + 3) as u32 % 32;

        for index in 0..count {
            registers.set(index, pattern(index));
        }

        for index in 0..count {
            registers.set(index, 31 - pattern(index));

            for other in 0..count {
                let expected = if other <= index {
                    31 - pattern(other)
                } else {
                    pattern(other)
                };

                assert_eq!(registers.get(other), expected);
            }
        }
    }

    #[test]
    fn test_registers_set_greater() {
        let mut registers = PackedRegisters::with_count(10);

        assert_eq!(registers.zeros(), 10);

        assert!(!registers.set_greater(1, 0));

        assert_eq!(registers.buf, vec![0; 7]);
        assert_eq!(registers.zeros(), 10);

        assert!(registers.set_greater(1, 0b11));

        assert_eq!(registers.get(1), 0b11);
        assert_eq!(registers.zeros(), 9);

        assert!(registers.set_greater(9, 0x7));

        assert_eq!(registers.get(9), 0x7);
        assert_eq!(registers.zeros(), 8);

        assert!(!registers.set_greater(1, 0b10));

        assert_eq!(registers.get(1), 0b11);
        assert_eq!(registers.zeros(), 8);

        assert!(registers.set_greater(9, 40));

        assert_eq!(registers.get(9), 31);
        assert_eq!(registers.zeros(), 8);

        assert!(!registers.set_greater(9, 35));
    }

    #[test]
    fn test_word_registers() {
        let mut registers = WordRegisters::with_count(10);

        assert_eq!(registers.count(), 10);
        assert_eq!(registers.zeros(), 10);

        assert!(registers.set_greater(4, 12));
        assert!(!registers.set_greater(4, 11));
        assert!(registers.set_greater(7, 33));

        assert_eq!(registers.get(4), 12);
        assert_eq!(registers.get(7), 31);
        assert_eq!(registers.zeros(), 8);

        registers.set(4, 0);

        assert_eq!(registers.zeros(), 9);

        assert_eq!(
            registers.iter().collect::<Vec<_>>(),
            vec![0, 0, 0, 0, 0, 0, 0, 31, 0, 0]
        );

        registers.clear();

        assert_eq!(registers.zeros(), 10);
        assert!(registers.iter().all(|value| value == 0));
    }

    #[test]
    fn test_registers_zeros_match_contents() {
        let mut packed = PackedRegisters::with_count(64);
        let mut word = WordRegisters::with_count(64);

        for step in 0..500usize {
            let index = (step * 37) % 64;
            let value = ((step * 13) % 40) as u32;

            if step % 3 == 0 {
                packed.set(index, value);
                word.set(index, value);
            } else {
                packed.set_greater(index, value);
                word.set_greater(index, value);
            }

            let zeros = packed.iter().filter(|&value| value == 0).count();

            assert_eq!(packed.zeros(), zeros);
            assert_eq!(word.zeros(), zeros);
            assert!(packed.iter().eq(word.iter()));
        }

        packed.clear();

        assert_eq!(packed.zeros(), 64);
        assert_eq!(packed.buf, vec![0; 40]);
    }

    #[test]
    fn test_size_in_bytes() {
        let packed = PackedRegisters::with_count(256);
        let word = WordRegisters::with_count(256);

        assert_eq!(packed.size_in_bytes(), 160);
        assert_eq!(packed.memory_usage_bytes(), 160);
        assert_eq!(word.size_in_bytes(), 1024);

        for precision in 1..=16 {
            let count = Estimator::register_count(precision);
            let packed = PackedRegisters::with_count(count);

            assert_eq!(packed.size_in_bytes(), ceil(count * 5, 8));

            if precision >= 3 {
                assert_eq!(packed.size_in_bytes(), count * 5 / 8);
            }
        }
    }

    #[test]
    fn test_estimate_raw() {
        let (raw, zeros) = Estimator::estimate_raw([0u32; 16].into_iter(), 16);

        assert_eq!(zeros, 16);
        assert!((raw - 0.7213 * 16.0).abs() < 1e-9);

        let registers = [1u32, 2, 0, 3];
        let (raw, zeros) = Estimator::estimate_raw(registers.into_iter(), 4);

        assert_eq!(zeros, 1);
        assert!((raw - 0.7213 * 16.0 / 1.875).abs() < 1e-9);
    }

    #[test]
    fn test_linear_count() {
        assert_eq!(Estimator::linear_count(16, 16), 0.0);
        assert!(
            (Estimator::linear_count(256, 128) - 256.0 * 2f64.ln()).abs()
                < 1e-9
        );
    }

    #[test]
    fn test_ceil() {
        assert_eq!(ceil(10, 8), 2);
        assert_eq!(ceil(16, 8), 2);
        assert_eq!(ceil(0, 8), 0);
        assert_eq!(ceil(1280, 8), 160);
    }

    #[cfg(feature = "bench-units")]
    mod benches {
        extern crate test;

        use super::*;
        use test::{black_box, Bencher};

        #[bench]
        fn bench_packed_registers_get(b: &mut Bencher) {
            let registers = PackedRegisters::with_count(1000);

            b.iter(|| {
                for i in 0..1000 {
                    let val = registers.get(i);
                    black_box(val);
                }
            })
        }

        #[bench]
        fn bench_packed_registers_set(b: &mut Bencher) {
            let mut registers = PackedRegisters::with_count(1000);

            b.iter(|| {
                for i in 0..1000 {
                    registers.set(i, 23);
                }
            })
        }
    }
}
