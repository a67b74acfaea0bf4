//! Randomized intensity bounds for one fuzzing attempt.

use crate::MAX_FUZZ_INTENSITY;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fmt;

/// Magnitude of random mutation, `0..=10`. Zero disables mutation entirely.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Intensity(u8);

impl Intensity {
    /// Clamps out of range values into `0..=10`.
    pub fn new(value: i64) -> Self {
        Intensity(value.clamp(0, MAX_FUZZ_INTENSITY as i64) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// The next intensity, wrapping from 10 back to 0.
    pub fn cycle(&self) -> Self {
        Intensity((self.0 + 1) % (MAX_FUZZ_INTENSITY + 1))
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inclusive `lo..=hi` range with `lo <= hi`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct IntensityRange {
    pub lo: u32,
    pub hi: u32,
}

impl IntensityRange {
    /// Draws two values in `0..=ceiling` and orders them.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, ceiling: u32) -> Self {
        let a = rng.gen_range(0..=ceiling);
        let b = rng.gen_range(0..=ceiling);

        if a < b {
            IntensityRange { lo: a, hi: b }
        } else {
            IntensityRange { lo: b, hi: a }
        }
    }
}

impl fmt::Display for IntensityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.lo, self.hi)
    }
}

/// Immutable bounds for every mutation knob, derived once per attempt.
///
/// `mutate`, `add` and `remove` are percentages of a packet's original
/// length. `super_add`, when enabled, replaces `add` with an absolute byte
/// count. `rounds` bounds how many mutation rounds a packet goes through.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct FuzzParameters {
    pub intensity: Intensity,
    pub mutate: IntensityRange,
    pub add: IntensityRange,
    pub super_add: IntensityRange,
    pub super_add_enabled: bool,
    pub remove: IntensityRange,
    pub rounds: IntensityRange,
}

impl FuzzParameters {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, intensity: Intensity) -> Self {
        let dial = intensity.value() as u32;

        let mutate = IntensityRange::generate(rng, 10 * dial);
        let add = IntensityRange::generate(rng, 10 * dial);
        let super_add = IntensityRange::generate(rng, 1000 * dial);
        let super_add_enabled = rng.gen_range(0..=100) <= 50;
        let remove = IntensityRange::generate(rng, 10 * dial);
        let rounds = IntensityRange::generate(rng, dial);

        FuzzParameters { intensity, mutate, add, super_add, super_add_enabled, remove, rounds }
    }

    /// The parameters an attempt seeded with `seed` runs with.
    pub fn for_seed(seed: u64, intensity: Intensity) -> Self {
        Self::generate(&mut StdRng::seed_from_u64(seed), intensity)
    }
}

impl fmt::Display for FuzzParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "intensity: {}", self.intensity)?;
        writeln!(f, "mutate %: {}", self.mutate)?;
        writeln!(f, "add %: {}", self.add)?;
        writeln!(f, "super add: {} (enabled: {})", self.super_add, self.super_add_enabled)?;
        writeln!(f, "remove %: {}", self.remove)?;
        write!(f, "rounds: {}", self.rounds)
    }
}
