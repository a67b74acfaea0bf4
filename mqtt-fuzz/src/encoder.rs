use bytes::{BufMut, Bytes, BytesMut};

/// Largest value an MQTT variable byte integer can hold.
pub const MAX_VARIABLE_INT: u32 = 268_435_455;

pub fn encode_variable_int(value: u32, bytes: &mut BytesMut) -> usize {
    let mut x = value;
    let mut byte_counter = 0;

    loop {
        let mut encoded_byte: u8 = (x % 128) as u8;
        x /= 128;

        if x > 0 {
            encoded_byte |= 128;
        }

        bytes.put_u8(encoded_byte);

        byte_counter += 1;

        if x == 0 {
            break;
        }
    }

    byte_counter
}

pub fn encode_string(value: &str, bytes: &mut BytesMut) {
    bytes.put_u16(value.len() as u16);
    bytes.put_slice(value.as_bytes());
}

pub fn encode_binary_data(value: &[u8], bytes: &mut BytesMut) {
    bytes.put_u16(value.len() as u16);
    bytes.put_slice(value);
}

/// Prefixes `body` with a fixed header byte and its remaining length.
pub fn frame_packet(first_byte: u8, body: &[u8]) -> Bytes {
    let mut bytes = BytesMut::with_capacity(body.len() + 5);
    bytes.put_u8(first_byte);
    encode_variable_int(body.len() as u32, &mut bytes);
    bytes.put_slice(body);

    bytes.freeze()
}
