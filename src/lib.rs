//! A HyperLogLog sketch for estimating the number of *distinct* strings
//! (*cardinality*) in a stream.
//!
//! HyperLogLog, described by P. Flajolet et al. in *HyperLogLog: the analysis
//! of a near-optimal cardinality estimation algorithm*, keeps `2^p` small
//! registers, each holding the longest run of leading zeros observed among
//! the hashes routed to it. The harmonic mean of the registers gives the
//! estimate, with a relative standard error of about `1.04 / sqrt(2^p)`.
//!
//! The sketch is parameterised over two things:
//!
//! * a [`HashFunction`] mapping a string to a 32-bit hash, injected at
//!   construction, and
//! * a [`RegisterStore`] holding the registers. [`WordRegisters`] keeps one
//!   `u32` per register, [`PackedRegisters`] packs every register into a
//!   5-bit field, using roughly an eighth of the memory.
//!
//! Both stores produce identical estimates for identical input.
//!
//! # Examples
//!
//! ```
//! use hyperloglog_packed::{CompactSketch, HyperLogLog, PolynomialHash};
//!
//! let mut hll = CompactSketch::new(8, PolynomialHash).unwrap();
//!
//! assert_eq!(hll.estimate(), 0.0);
//!
//! hll.add("alpha");
//! hll.add("beta");
//! hll.add("alpha");
//!
//! assert_eq!(hll.estimate().round() as u32, 2);
//! assert_eq!(hll.memory_usage_bytes(), 160);
//! ```

#![cfg_attr(feature = "bench-units", feature(test))]

mod common;
mod hash;
mod hyperloglog;

pub use crate::common::{PackedRegisters, RegisterStore, WordRegisters};
pub use crate::hash::{BuildHasherAdapter, HashFunction, PolynomialHash};
pub use crate::hyperloglog::{CardinalitySketch, CompactSketch, WordSketch};

/// A trait that should be implemented by any HyperLogLog variant.
pub trait HyperLogLog {
    /// Adds a new string to the multiset.
    fn add(&mut self, item: &str);
    /// Estimates the cardinality of the multiset.
    fn estimate(&self) -> f64;
    /// Resets the multiset to empty, keeping the allocated registers.
    fn clear(&mut self);
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum HyperLogLogError {
    #[error("precision {0} is out of bounds [1, 16].")]
    InvalidPrecision(u8),
}
