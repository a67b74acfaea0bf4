#![no_main]
use libfuzzer_sys::fuzz_target;

use mqtt_fuzz::decoder;
use mqtt_fuzz::types::ProtocolVersion;

fuzz_target!(|data: &[u8]| {
    if let Ok(fields) = decoder::decode_packet(data, ProtocolVersion::V311) {
        assert!(fields.packet_len <= data.len());
    }

    let _ = decoder::decode_session(data, ProtocolVersion::V311);
});
