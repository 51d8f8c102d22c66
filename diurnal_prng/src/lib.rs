// Deterministic, portable randomness for the Diurnal sequencer.
//
// Three pieces live here:
// - `RandomSource`: the trait every engine stage draws from. Harmony
//   transitions, motif selection, coin flips and timer resets all go through
//   it, so a whole tick can be replayed from a seed or scripted in tests.
// - `SeededRng`: xoshiro256++ (Blackman & Vigna, 2019) seeded via SplitMix64.
//   Hand-rolled with zero external dependencies so the output is identical
//   on every platform.
// - `ScriptedRng`: replays fixed index/unit-interval choices, falling back to
//   a `SeededRng` once a script runs dry. Used to force specific transitions
//   in tests without depending on the generator's exact stream.
//
// **Critical constraint: determinism.** `SeededRng` must produce identical
// output given the same prior state, regardless of platform, compiler version
// or optimization level. No floating point in the core generator, no OS
// entropy.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Source of uniform random choices.
///
/// Only `next_u64` is required; the sampling helpers have portable default
/// implementations. Implementors that want to steer choices (see
/// `ScriptedRng`) override `range_u64` and `next_f64`.
pub trait RandomSource {
    /// Next raw 64-bit value.
    fn next_u64(&mut self) -> u64;

    /// Uniform `f64` in [0, 1) from the upper 53 bits of a `u64`.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[low, high)`. Rejection sampling avoids modulo
    /// bias. Panics if `low >= high`.
    fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Uniform `usize` in `[low, high)`. Panics if `low >= high`.
    fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Uniform `u32` in `[low, high]`. Panics if `low > high`.
    fn range_u32_inclusive(&mut self, low: u32, high: u32) -> u32 {
        assert!(low <= high, "range_u32_inclusive: low must be <= high");
        self.range_u64(low as u64, high as u64 + 1) as u32
    }

    /// `true` with probability `p`. `p <= 0.0` is always false, `p >= 1.0`
    /// always true.
    fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Pick one element uniformly, or `None` for an empty slice.
    fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T>
    where
        Self: Sized,
    {
        if items.is_empty() {
            None
        } else {
            let idx = self.range_usize(0, items.len());
            items.get(idx)
        }
    }
}

/// Xoshiro256++ generator, the sequencer's default randomness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeededRng {
    s: [u64; 4],
}

impl SeededRng {
    /// Create a generator seeded from a `u64`. SplitMix64 expands the seed
    /// into the 256-bit state, so equal seeds give equal streams.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }
}

impl RandomSource for SeededRng {
    fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }
}

/// SplitMix64, used only to expand a `u64` seed into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// A random source that replays scripted choices.
///
/// `range_u64(low, high)` pops the next scripted index and returns
/// `low + index % (high - low)`, so scripting `2` when choosing from a
/// four-element list always picks the third element. `next_f64` pops the
/// next scripted unit value (so `0.0` makes every `random_bool(p > 0)` true
/// and `0.999` makes `random_bool(0.5)` false). When a script is exhausted
/// the fallback generator takes over.
#[derive(Clone, Debug)]
pub struct ScriptedRng {
    indices: VecDeque<u64>,
    units: VecDeque<f64>,
    fallback: SeededRng,
}

impl ScriptedRng {
    pub fn new(indices: impl IntoIterator<Item = u64>, units: impl IntoIterator<Item = f64>) -> Self {
        Self {
            indices: indices.into_iter().collect(),
            units: units.into_iter().collect(),
            fallback: SeededRng::new(0),
        }
    }

    /// Number of scripted choices not yet consumed, as (indices, units).
    pub fn remaining(&self) -> (usize, usize) {
        (self.indices.len(), self.units.len())
    }
}

impl RandomSource for ScriptedRng {
    fn next_u64(&mut self) -> u64 {
        self.fallback.next_u64()
    }

    fn next_f64(&mut self) -> f64 {
        match self.units.pop_front() {
            Some(u) => u.clamp(0.0, 0.999_999),
            None => self.fallback.next_f64(),
        }
    }

    fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        match self.indices.pop_front() {
            Some(i) => low + i % (high - low),
            None => self.fallback.range_u64(low, high),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_output() {
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_different_output() {
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(43);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn f64_in_unit_range() {
        let mut rng = SeededRng::new(12345);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "f64 out of range: {v}");
        }
    }

    #[test]
    fn range_usize_within_bounds() {
        let mut rng = SeededRng::new(555);
        for _ in 0..10_000 {
            let v = rng.range_usize(5, 15);
            assert!((5..15).contains(&v), "range_usize out of range: {v}");
        }
    }

    #[test]
    fn range_u32_inclusive_reaches_both_ends() {
        let mut rng = SeededRng::new(666);
        let mut seen = [false; 5];
        for _ in 0..10_000 {
            let v = rng.range_u32_inclusive(20, 24);
            assert!((20..=24).contains(&v));
            seen[(v - 20) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s), "every value in 20..=24 should appear");
    }

    #[test]
    fn random_bool_distribution() {
        let mut rng = SeededRng::new(42);
        let n = 10_000;
        let hits = (0..n).filter(|_| rng.random_bool(0.5)).count();
        let pct = hits as f64 / n as f64;
        assert!((0.45..0.55).contains(&pct), "random_bool(0.5) gave {:.1}%", pct * 100.0);
    }

    #[test]
    fn random_bool_extremes() {
        let mut rng = SeededRng::new(42);
        for _ in 0..100 {
            assert!(!rng.random_bool(0.0));
            assert!(rng.random_bool(1.0));
        }
    }

    #[test]
    fn choose_empty_is_none() {
        let mut rng = SeededRng::new(1);
        let empty: [u8; 0] = [];
        assert!(rng.choose(&empty).is_none());
        assert_eq!(rng.choose(&[7]), Some(&7));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = SeededRng::new(42);
        for _ in 0..100 {
            rng.next_u64();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: SeededRng = serde_json::from_str(&json).unwrap();
        for _ in 0..100 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }

    #[test]
    fn scripted_indices_steer_choose() {
        let mut rng = ScriptedRng::new([2, 5], []);
        let items = ["a", "b", "c", "d"];
        assert_eq!(rng.choose(&items), Some(&"c"));
        // 5 % 4 == 1
        assert_eq!(rng.choose(&items), Some(&"b"));
        assert_eq!(rng.remaining(), (0, 0));
        // Exhausted script falls back to the seeded stream, still in range.
        assert!(items.contains(rng.choose(&items).unwrap()));
    }

    #[test]
    fn scripted_units_steer_coin_flips() {
        let mut rng = ScriptedRng::new([], [0.0, 0.99]);
        assert!(rng.random_bool(0.5));
        assert!(!rng.random_bool(0.5));
    }
}
