//! One fuzzing attempt, reproducible from `(corpus, config, seed)`.

use crate::{
    corpus::Corpus,
    mutator::fuzz_target,
    params::{FuzzParameters, Intensity},
    plan::MutationPlan,
    session::{construct_session, ConstructIntensity},
    types::{FuzzError, PacketType},
};
use bytes::Bytes;
use rand::{rngs::StdRng, SeedableRng};
use std::collections::BTreeMap;

/// Packet types every attempt draws a seed for, in draw order. Types outside
/// this list are drawn afterwards when the corpus has them.
pub const REQUIRED_PACKET_TYPES: [PacketType; 4] = [
    PacketType::Connect,
    PacketType::Authenticate,
    PacketType::Publish,
    PacketType::Disconnect,
];

/// Runs between fuzz intensity steps under autonomous intensity.
pub const FUZZ_INTENSITY_STEP: u64 = 1000;
/// Runs between construct intensity steps under autonomous intensity.
pub const CONSTRUCT_INTENSITY_STEP: u64 = 250;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct FuzzConfig {
    pub fuzz_intensity: Intensity,
    pub construct_intensity: ConstructIntensity,
}

impl FuzzConfig {
    pub fn new(fuzz_intensity: Intensity, construct_intensity: ConstructIntensity) -> Self {
        FuzzConfig { fuzz_intensity, construct_intensity }
    }

    /// The configuration to use once the run counter reaches `total_runs`
    /// under autonomous intensity.
    pub fn drift(&self, total_runs: u64) -> Self {
        let mut next = *self;

        if total_runs % FUZZ_INTENSITY_STEP == 0 {
            next.fuzz_intensity = self.fuzz_intensity.cycle();
        }

        if total_runs % CONSTRUCT_INTENSITY_STEP == 0 {
            next.construct_intensity = self.construct_intensity.cycle();
        }

        next
    }
}

#[derive(Debug, Clone)]
pub struct FuzzAttempt {
    pub seed: u64,
    pub params: FuzzParameters,
    pub originals: BTreeMap<PacketType, Bytes>,
    pub mutated: BTreeMap<PacketType, Vec<u8>>,
    /// CONNECT, PUBLISH, DISCONNECT before mutation.
    pub unfuzzed: Bytes,
    /// The stream to send.
    pub fuzzed: Bytes,
}

/// Draws seeds, mutates them and assembles the session for one attempt.
///
/// The RNG is seeded from `seed` and consumed in a fixed order: parameters,
/// seed selection, then one plan and its rounds per packet, then the session
/// layout.
pub fn fuzz_attempt(
    corpus: &Corpus,
    config: &FuzzConfig,
    seed: u64,
) -> Result<FuzzAttempt, FuzzError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let params = FuzzParameters::generate(&mut rng, config.fuzz_intensity);

    let optional =
        corpus.packet_types().filter(|packet_type| !REQUIRED_PACKET_TYPES.contains(packet_type));

    let mut selected = Vec::new();

    for packet_type in REQUIRED_PACKET_TYPES.into_iter().chain(optional) {
        selected.push((packet_type, corpus.select(packet_type, &mut rng)?));
    }

    let skeleton: BTreeMap<PacketType, Vec<u8>> =
        selected.iter().map(|(packet_type, packet)| (*packet_type, packet.to_vec())).collect();
    let unfuzzed = construct_session(&skeleton, ConstructIntensity::Level0, &mut rng)?;

    let mut mutated = BTreeMap::new();

    for (packet_type, packet) in &selected {
        let mut buffer = packet.to_vec();
        let plan = MutationPlan::derive(&params, buffer.len(), &mut rng);

        fuzz_target(&mut buffer, &plan, &mut rng)?;
        mutated.insert(*packet_type, buffer);
    }

    let fuzzed = construct_session(&mutated, config.construct_intensity, &mut rng)?;

    Ok(FuzzAttempt {
        seed,
        params,
        originals: selected.into_iter().collect(),
        mutated,
        unfuzzed,
        fuzzed,
    })
}
