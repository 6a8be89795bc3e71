use core::fmt;
use core::hash::{BuildHasher, Hash, Hasher};

/// A capability mapping a string to a 32-bit hash.
///
/// Implementations must be deterministic and should spread their output
/// evenly over all 32 bits: the high bits select a register and the low bits
/// drive the rank, so poor mixing in either end degrades the estimate.
pub trait HashFunction {
    /// Hashes `item` into a 32-bit unsigned integer.
    fn hash(&self, item: &str) -> u32;
}

impl<F> HashFunction for F
where
    F: Fn(&str) -> u32,
{
    #[inline]
    fn hash(&self, item: &str) -> u32 {
        self(item)
    }
}

/// Multiplicative string hash, `h = h * 31 + byte` over the UTF-8 bytes.
///
/// Cheap and deterministic, but short strings never reach the upper bits of
/// the word, so it is a poor fit for small precisions over short keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PolynomialHash;

impl PolynomialHash {
    // The multiplier applied before adding every byte.
    const MULTIPLIER: u32 = 31;
}

impl HashFunction for PolynomialHash {
    #[inline]
    fn hash(&self, item: &str) -> u32 {
        item.bytes().fold(0u32, |h, byte| {
            h.wrapping_mul(Self::MULTIPLIER).wrapping_add(u32::from(byte))
        })
    }
}

/// Adapts a [`BuildHasher`] to a [`HashFunction`].
///
/// The string is fed through a fresh hasher and the higher 32 bits of the
/// 64-bit result are dropped.
///
/// # Examples
///
/// ```
/// use std::collections::hash_map::DefaultHasher;
/// use std::hash::BuildHasherDefault;
///
/// use hyperloglog_packed::{BuildHasherAdapter, HashFunction};
///
/// let hasher =
///     BuildHasherAdapter::new(BuildHasherDefault::<DefaultHasher>::default());
///
/// assert_eq!(hasher.hash("abc"), hasher.hash("abc"));
/// ```
#[derive(Clone, Default)]
pub struct BuildHasherAdapter<B> {
    builder: B,
}

impl<B> BuildHasherAdapter<B>
where
    B: BuildHasher,
{
    /// Creates a new adapter over `builder`.
    pub fn new(builder: B) -> Self {
        BuildHasherAdapter { builder }
    }
}

impl<B> HashFunction for BuildHasherAdapter<B>
where
    B: BuildHasher,
{
    #[inline]
    fn hash(&self, item: &str) -> u32 {
        // Create a new hasher.
        let mut hasher = self.builder.build_hasher();
        // Calculate the hash.
        item.hash(&mut hasher);
        // Drops the higher 32 bits.
        hasher.finish() as u32
    }
}

impl<B> fmt::Debug for BuildHasherAdapter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildHasherAdapter").finish_non_exhaustive()
    }
}
