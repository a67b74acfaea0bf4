//! Byte level mutation primitives and the round loop that applies a
//! [`MutationPlan`] to one packet.

use crate::{
    plan::{choose_operations, MutationPlan, Operation},
    types::FuzzError,
};
use rand::{seq::index, Rng};

/// Deletes up to `count` bytes. Each iteration picks an index in `0..=len`;
/// picking `len` removes nothing.
pub fn remove<R: Rng + ?Sized>(
    buffer: &mut Vec<u8>,
    count: usize,
    rng: &mut R,
) -> Result<(), FuzzError> {
    if buffer.is_empty() {
        return Err(FuzzError::MalformedMutationInput);
    }

    for _ in 0..count {
        let base = rng.gen_range(0..=buffer.len());

        if base < buffer.len() {
            buffer.remove(base);
        }
    }

    Ok(())
}

/// Inserts exactly `count` random bytes at random positions.
pub fn add<R: Rng + ?Sized>(buffer: &mut Vec<u8>, count: usize, rng: &mut R) {
    buffer.reserve(count);

    for _ in 0..count {
        let base = rng.gen_range(0..=buffer.len());
        let byte: u8 = rng.gen();
        buffer.insert(base, byte);
    }
}

/// Overwrites `min(count, len)` distinct positions with random bytes.
pub fn mutate<R: Rng + ?Sized>(
    buffer: &mut [u8],
    count: usize,
    rng: &mut R,
) -> Result<(), FuzzError> {
    if buffer.is_empty() {
        return Err(FuzzError::MalformedMutationInput);
    }

    for position in mutation_positions(buffer.len(), count, rng) {
        buffer[position] = rng.gen();
    }

    Ok(())
}

/// `min(count, len)` distinct positions in `0..len`.
pub fn mutation_positions<R: Rng + ?Sized>(len: usize, count: usize, rng: &mut R) -> Vec<usize> {
    index::sample(rng, len, count.min(len)).into_vec()
}

/// Runs every round of `plan` over `buffer`.
///
/// Each round applies a random non-empty subset of the operations in random
/// order, each one seeing the output of the previous. An empty seed is
/// rejected and a no-op plan leaves the buffer as it is. A remove or mutate
/// step that meets a buffer emptied by an earlier step is skipped.
pub fn fuzz_target<R: Rng + ?Sized>(
    buffer: &mut Vec<u8>,
    plan: &MutationPlan,
    rng: &mut R,
) -> Result<(), FuzzError> {
    if buffer.is_empty() {
        return Err(FuzzError::MalformedMutationInput);
    }

    if plan.is_noop() {
        return Ok(());
    }

    for _ in 0..plan.rounds {
        for operation in choose_operations(rng) {
            let count = plan.count(operation);

            match operation {
                Operation::Add => add(buffer, count, rng),
                Operation::Mutate | Operation::Remove if buffer.is_empty() => {},
                Operation::Mutate => mutate(buffer, count, rng)?,
                Operation::Remove => remove(buffer, count, rng)?,
            }
        }
    }

    Ok(())
}
