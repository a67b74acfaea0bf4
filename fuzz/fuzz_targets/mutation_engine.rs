#![no_main]
use libfuzzer_sys::fuzz_target;

use mqtt_fuzz::mutator;
use mqtt_fuzz::params::{FuzzParameters, Intensity};
use mqtt_fuzz::plan::MutationPlan;
use rand::{rngs::StdRng, SeedableRng};

fuzz_target!(|data: &[u8]| {
    if data.len() < 10 {
        return;
    }

    let (header, seed_packet) = data.split_at(9);
    let seed = u64::from_le_bytes(header[..8].try_into().unwrap());
    let intensity = Intensity::new(header[8] as i64);

    let mut rng = StdRng::seed_from_u64(seed);
    let params = FuzzParameters::generate(&mut rng, intensity);
    let plan = MutationPlan::derive(&params, seed_packet.len(), &mut rng);

    let mut buffer = seed_packet.to_vec();
    mutator::fuzz_target(&mut buffer, &plan, &mut rng).unwrap();

    if intensity.value() == 0 {
        assert_eq!(buffer, seed_packet);
    }
});
