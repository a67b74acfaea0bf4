use crate::params::{FuzzParameters, IntensityRange};
use rand::{seq::SliceRandom, Rng};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Mutate,
    Add,
    Remove,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Mutate, Operation::Add, Operation::Remove];
}

/// Concrete byte counts for one packet, computed once from its original
/// length and reused by every round.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct MutationPlan {
    pub mutate_count: usize,
    pub add_count: usize,
    pub remove_count: usize,
    pub rounds: u32,
}

/// `round(ratio / 100 * len)`, with `ratio` drawn from `lo..hi` unless the
/// range is a single value.
fn select_count<R: Rng + ?Sized>(range: IntensityRange, len: usize, rng: &mut R) -> usize {
    let ratio = if range.lo == range.hi { range.lo } else { rng.gen_range(range.lo..range.hi) };

    (ratio as f64 / 100.0 * len as f64).round() as usize
}

impl MutationPlan {
    pub fn derive<R: Rng + ?Sized>(
        params: &FuzzParameters,
        original_len: usize,
        rng: &mut R,
    ) -> Self {
        let mutate_count = select_count(params.mutate, original_len, rng);

        let add_count = if params.super_add_enabled {
            rng.gen_range(params.super_add.lo..=params.super_add.hi) as usize
        } else {
            select_count(params.add, original_len, rng)
        };

        let remove_count = select_count(params.remove, original_len, rng);
        let rounds = rng.gen_range(params.rounds.lo..=params.rounds.hi);

        MutationPlan { mutate_count, add_count, remove_count, rounds }
    }

    pub fn count(&self, operation: Operation) -> usize {
        match operation {
            Operation::Mutate => self.mutate_count,
            Operation::Add => self.add_count,
            Operation::Remove => self.remove_count,
        }
    }

    /// True when applying the plan cannot change a buffer.
    pub fn is_noop(&self) -> bool {
        self.rounds == 0
            || (self.mutate_count == 0 && self.add_count == 0 && self.remove_count == 0)
    }
}

/// A non-empty subset of the operations, in random order.
pub fn choose_operations<R: Rng + ?Sized>(rng: &mut R) -> Vec<Operation> {
    let amount = rng.gen_range(1..=Operation::ALL.len());
    Operation::ALL.choose_multiple(rng, amount).copied().collect()
}
