use std::collections::HashSet;

use rand::distributions::{Distribution, Uniform};
use rand::prelude::*;

use hyperloglog_packed::HashFunction;

// The symbols random strings are drawn from.
const ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-";

// Generates streams of random strings from a seeded RNG.
pub struct StreamGenerator {
    rng:     StdRng,
    symbols: Uniform<usize>,
    lengths: Uniform<usize>,
}

impl StreamGenerator {
    // Shortest string generated.
    pub const MIN_LEN: usize = 5;
    // Longest string generated.
    pub const MAX_LEN: usize = 30;

    pub fn new(seed: u64) -> Self {
        StreamGenerator {
            rng:     StdRng::seed_from_u64(seed),
            symbols: Uniform::new(0, ALPHABET.len()),
            lengths: Uniform::new_inclusive(Self::MIN_LEN, Self::MAX_LEN),
        }
    }

    // Returns a random string of `MIN_LEN..=MAX_LEN` symbols.
    pub fn make_string(&mut self) -> String {
        let len = self.lengths.sample(&mut self.rng);

        (0..len)
            .map(|_| char::from(ALPHABET[self.symbols.sample(&mut self.rng)]))
            .collect()
    }

    // Returns a stream of `count` random strings.
    pub fn make_stream(&mut self, count: usize) -> Vec<String> {
        (0..count).map(|_| self.make_string()).collect()
    }
}

// Returns the prefixes of `stream` holding `percent`% of its items, for
// every percentage in `percents`.
pub fn split_stream<'a>(
    stream: &'a [String],
    percents: &[usize],
) -> Vec<&'a [String]> {
    percents
        .iter()
        .map(|percent| {
            let len = (stream.len() * percent / 100).min(stream.len());

            &stream[..len]
        })
        .collect()
}

// Returns the exact number of distinct strings in `stream`.
pub fn count_unique(stream: &[String]) -> usize {
    stream.iter().collect::<HashSet<_>>().len()
}

// Returns the chi-squared statistic of `stream` hashed into `buckets`
// equally likely buckets.
pub fn chi_squared<H>(stream: &[String], hasher: &H, buckets: usize) -> f64
where
    H: HashFunction,
{
    let mut counts = vec![0usize; buckets];

    for item in stream {
        counts[hasher.hash(item) as usize % buckets] += 1;
    }

    let expected = stream.len() as f64 / buckets as f64;

    counts
        .iter()
        .map(|&count| (count as f64 - expected).powi(2) / expected)
        .sum()
}
