use tracing::{debug, trace};

use crate::common::*;
use crate::hash::HashFunction;
use crate::HyperLogLog;
use crate::HyperLogLogError;

/// Implements the original HyperLogLog algorithm over strings.
///
/// This implementation is based on the original paper of P. Flajolet et al:
///
/// *HyperLogLog: the analysis of a near-optimal cardinality estimation
/// algorithm.*
///
/// - Hashes every string to 32 bits with an injected [`HashFunction`].
/// - The top `precision` bits of the hash select the register, the
///   remaining bits give the rank.
/// - Stores registers in any [`RegisterStore`]. Use [`CompactSketch`] for
///   5-bit packed registers and [`WordSketch`] for one `u32` per register.
/// - Uses the asymptotic bias correction constant `0.7213` for every
///   register count, so sketches with fewer than 128 registers carry a
///   small bias.
/// - Applies linear counting while the raw estimate is at most `2.5 * m`
///   and some register is still empty. There is no large range correction.
///
/// # Examples
///
/// ```
/// use hyperloglog_packed::{HyperLogLog, WordSketch};
///
/// let mut hll = WordSketch::new(10, |item: &str| {
///     u32::from_str_radix(item, 16).unwrap_or(0)
/// })
/// .unwrap();
///
/// hll.add("00600000");
/// hll.add("00600000");
///
/// assert_eq!(hll.register(1), 1);
/// assert_eq!(hll.estimate().round() as u32, 1);
/// ```
///
/// # References
///
/// - ["HyperLogLog: the analysis of a near-optimal cardinality estimation
///   algorithm", Philippe Flajolet, Éric Fusy, Olivier Gandouet and Frédéric
///   Meunier.](http://algo.inria.fr/flajolet/Publications/FlFuGaMe07.pdf)
///
#[derive(Clone, Debug)]
pub struct CardinalitySketch<F, R = PackedRegisters>
where
    F: HashFunction,
    R: RegisterStore,
{
    hasher:    F,
    count:     usize,
    precision: u8,
    registers: R,
}

/// A [`CardinalitySketch`] with 5-bit packed registers.
pub type CompactSketch<F> = CardinalitySketch<F, PackedRegisters>;

/// A [`CardinalitySketch`] with one `u32` word per register.
pub type WordSketch<F> = CardinalitySketch<F, WordRegisters>;

impl<F, R> CardinalitySketch<F, R>
where
    F: HashFunction,
    R: RegisterStore,
{
    // Minimum precision allowed.
    const MIN_PRECISION: u8 = 1;
    // Maximum precision allowed, keeps at least 16 bits for the rank.
    const MAX_PRECISION: u8 = 16;

    /// Creates a new CardinalitySketch instance.
    pub fn new(precision: u8, hasher: F) -> Result<Self, HyperLogLogError> {
        // Ensure the specified precision is within bounds.
        if !(Self::MIN_PRECISION..=Self::MAX_PRECISION).contains(&precision) {
            return Err(HyperLogLogError::InvalidPrecision(precision));
        }

        // Calculate register count based on given precision.
        let count =
            <Self as HyperLogLogCommon>::register_count(precision);

        let registers = R::with_count(count);

        debug!(
            precision,
            registers = count,
            bytes = registers.size_in_bytes(),
            "created cardinality sketch"
        );

        Ok(CardinalitySketch {
            hasher:    hasher,
            count:     count,
            precision: precision,
            registers: registers,
        })
    }

    /// Adds a precomputed 32-bit hash to the multiset.
    ///
    /// [`HyperLogLog::add`] hashes its input and calls this.
    #[inline]
    pub fn insert_hash(&mut self, hash: u32) {
        // Calculate the register's index.
        let index: usize = (hash >> (32 - self.precision)) as usize;

        // Shift left the bits of the index.
        let hash = hash << self.precision;

        // Count leading zeros. When every remaining bit is zero, count the
        // whole (32 - precision) bit window.
        let zeros: u32 = 1 + if hash == 0 {
            32 - u32::from(self.precision)
        } else {
            hash.leading_zeros()
        };

        // Update the register with the max leading zeros counts.
        self.registers.set_greater(index, zeros);
    }

    /// Returns the precision of the sketch.
    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Returns the number of registers, `2^precision`.
    #[inline]
    pub fn register_count(&self) -> usize {
        self.count
    }

    /// Returns the value of the register at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`register_count`].
    ///
    /// [`register_count`]: CardinalitySketch::register_count
    #[inline]
    pub fn register(&self, index: usize) -> u32 {
        self.registers.get(index)
    }

    /// Returns the register store.
    #[inline]
    pub fn registers(&self) -> &R {
        &self.registers
    }

    /// Returns the number of bytes held by the registers.
    #[inline]
    pub fn memory_usage_bytes(&self) -> usize {
        self.registers.size_in_bytes()
    }
}

impl<F, R> HyperLogLogCommon for CardinalitySketch<F, R>
where
    F: HashFunction,
    R: RegisterStore,
{
}

impl<F, R> HyperLogLog for CardinalitySketch<F, R>
where
    F: HashFunction,
    R: RegisterStore,
{
    /// Adds a new string to the multiset.
    #[inline]
    fn add(&mut self, item: &str) {
        let hash = self.hasher.hash(item);

        self.insert_hash(hash);
    }

    /// Estimates the cardinality of the multiset.
    fn estimate(&self) -> f64 {
        // Calculate the raw estimate.
        let (raw, zeros) =
            Self::estimate_raw(self.registers.iter(), self.count);

        if raw <= 2.5 * self.count as f64 && zeros != 0 {
            // Apply small range correction.
            Self::linear_count(self.count, zeros)
        } else {
            raw
        }
    }

    /// Resets every register to zero.
    fn clear(&mut self) {
        self.registers.clear();

        trace!(precision = self.precision, "cleared cardinality sketch");
    }
}
