//! Structural decoder for MQTT control packets.
//!
//! The decoder does not build typed packets. It walks a packet left to right
//! and records where every field starts and ends, keeping the raw bytes of each
//! field. Fields common to every packet (fixed header, remaining length) land in
//! [`DecodedFields::universal`], everything else in [`DecodedFields::specific`].
//!
//! Fuzzed input is expected to be malformed most of the time, so every read is
//! bounds checked against the packet's declared end and failures are reported
//! as a [`DecodeError`] instead of a panic.

use crate::types::{DecodeError, PacketType, PropertyLayout, PropertyType, ProtocolVersion};
use bytes::{Buf, Bytes};
use std::{collections::HashMap, fmt, io::Cursor};

pub const MAX_VARIABLE_INT_BYTES: usize = 4;

macro_rules! require_length {
    ($ctx: expr, $len: expr) => {{
        let position = $ctx.position();
        if position + $len > $ctx.end {
            return Err(DecodeError::CursorOverrun { position, needed: $len, end: $ctx.end });
        }
    }};
}

/// Ordered field name to raw value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: Vec<(String, Bytes)>,
    /// Position of each key in `fields`.
    index: HashMap<String, usize>,
    /// Times each base name has been inserted.
    occurrences: HashMap<String, usize>,
}

impl FieldMap {
    /// Repeated names (user properties, repeated subscription identifiers)
    /// get a numeric suffix so no field is lost.
    fn insert(&mut self, name: String, value: Bytes) {
        let seen = self.occurrences.entry(name.clone()).or_insert(0);
        let key = match *seen {
            0 => name,
            n => format!("{} {}", name, n),
        };
        *seen += 1;

        self.index.insert(key.clone(), self.fields.len());
        self.fields.push((key, value));
    }

    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.index.get(name).map(|&i| &self.fields[i].1)
    }

    /// The field's raw bytes as a lowercase hex string.
    pub fn hex(&self, name: &str) -> Option<String> {
        self.get(name).map(hex::encode)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFields {
    pub packet_type: PacketType,
    /// Total size of the packet, fixed header included.
    pub packet_len: usize,
    pub universal: FieldMap,
    pub specific: FieldMap,
}

impl fmt::Display for DecodedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} bytes)", self.packet_type, self.packet_len)?;

        for (name, value) in self.universal.iter().chain(self.specific.iter()) {
            writeln!(f, "  {}: {}", name, hex::encode(value))?;
        }

        Ok(())
    }
}

/// Cursor state for one decode pass. Each packet type decoder receives it by
/// `&mut` and appends the fields it reads.
struct DecodeContext<'a> {
    bytes: Cursor<&'a [u8]>,
    end: usize,
    protocol_version: ProtocolVersion,
    universal: FieldMap,
    specific: FieldMap,
}

impl<'a> DecodeContext<'a> {
    fn new(bytes: &'a [u8], protocol_version: ProtocolVersion) -> Self {
        Self {
            end: bytes.len(),
            bytes: Cursor::new(bytes),
            protocol_version,
            universal: FieldMap::default(),
            specific: FieldMap::default(),
        }
    }

    fn position(&self) -> usize {
        self.bytes.position() as usize
    }

    fn remaining(&self) -> usize {
        self.end.saturating_sub(self.position())
    }

    fn is_v5(&self) -> bool {
        self.protocol_version == ProtocolVersion::V500
    }

    fn take(&mut self, len: usize) -> Result<Bytes, DecodeError> {
        require_length!(self, len);

        let position = self.position();
        let value = Bytes::copy_from_slice(&self.bytes.get_ref()[position..(position + len)]);
        self.bytes.advance(len);

        Ok(value)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        require_length!(self, 1);
        Ok(self.bytes.get_u8())
    }

    fn read_variable_int(&mut self) -> Result<(u32, Bytes), DecodeError> {
        let position = self.position();
        let bytes: &'a [u8] = *self.bytes.get_ref();
        let window = &bytes[position..self.end.max(position)];

        match decode_variable_int(window)? {
            Some((value, len)) => Ok((value, self.take(len)?)),
            None => Err(DecodeError::CursorOverrun {
                position,
                needed: window.len() + 1,
                end: self.end,
            }),
        }
    }

    /// Reads a two byte length followed by that many bytes, returning only
    /// the content. Strings and binary data share this layout.
    fn read_length_prefixed(&mut self) -> Result<Bytes, DecodeError> {
        let len = self.take(2)?.get_u16() as usize;
        self.take(len)
    }

    fn universal(&mut self, name: &str, value: Bytes) {
        self.universal.insert(name.to_string(), value);
    }

    fn specific<S: Into<String>>(&mut self, name: S, value: Bytes) {
        self.specific.insert(name.into(), value);
    }

    fn byte_field<S: Into<String>>(&mut self, name: S) -> Result<u8, DecodeError> {
        let value = self.take(1)?;
        let byte = value[0];
        self.specific(name, value);

        Ok(byte)
    }

    fn two_byte_field<S: Into<String>>(&mut self, name: S) -> Result<u16, DecodeError> {
        let value = self.take(2)?;
        let int = (&value[..]).get_u16();
        self.specific(name, value);

        Ok(int)
    }

    fn string_field<S: Into<String>>(&mut self, name: S) -> Result<(), DecodeError> {
        let value = self.read_length_prefixed()?;
        self.specific(name, value);

        Ok(())
    }

    fn binary_field<S: Into<String>>(&mut self, name: S) -> Result<(), DecodeError> {
        self.string_field(name)
    }

    fn finish(self, packet_type: PacketType, packet_len: usize) -> DecodedFields {
        DecodedFields {
            packet_type,
            packet_len,
            universal: self.universal,
            specific: self.specific,
        }
    }
}

/// Decodes an MQTT variable byte integer from the start of `bytes`.
///
/// Returns `Ok(None)` when the bytes end before the terminating byte and
/// `(value, encoded_len)` otherwise.
pub fn decode_variable_int(bytes: &[u8]) -> Result<Option<(u32, usize)>, DecodeError> {
    let mut multiplier: u32 = 1;
    let mut value: u32 = 0;

    for i in 0..MAX_VARIABLE_INT_BYTES {
        let encoded_byte = match bytes.get(i) {
            Some(byte) => *byte,
            None => return Ok(None),
        };

        value += ((encoded_byte & 0b0111_1111) as u32) * multiplier;

        multiplier *= 128;

        if encoded_byte & 0b1000_0000 == 0b0000_0000 {
            return Ok(Some((value, i + 1)));
        }
    }

    Err(DecodeError::InvalidVariableInt)
}

/// Size of the packet at the start of `bytes`, once its fixed header and
/// remaining length are readable.
pub fn peek_packet_len(bytes: &[u8]) -> Result<Option<usize>, DecodeError> {
    if bytes.is_empty() {
        return Ok(None);
    }

    match decode_variable_int(&bytes[1..])? {
        Some((remaining_length, len)) => Ok(Some(1 + len + remaining_length as usize)),
        None => Ok(None),
    }
}

fn decode_properties(ctx: &mut DecodeContext, length_field: &str) -> Result<(), DecodeError> {
    let (property_length, raw_length) = ctx.read_variable_int()?;
    ctx.specific(length_field, raw_length);

    let property_length = property_length as usize;
    require_length!(ctx, property_length);

    let start_cursor_pos = ctx.position();
    let block_end = start_cursor_pos + property_length;

    while ctx.position() < block_end {
        let property_id = ctx.read_u8()?;
        let property_type = PropertyType::try_from(property_id)
            .map_err(|_| DecodeError::InvalidPropertyId(property_id))?;
        let name = property_type.field_name();

        match property_type.layout() {
            PropertyLayout::Byte => {
                let value = ctx.take(1)?;
                ctx.specific(name, value);
            },
            PropertyLayout::TwoByteInt => {
                let value = ctx.take(2)?;
                ctx.specific(name, value);
            },
            PropertyLayout::FourByteInt => {
                let value = ctx.take(4)?;
                ctx.specific(name, value);
            },
            PropertyLayout::VariableByteInt => {
                let (_, raw) = ctx.read_variable_int()?;
                ctx.specific(name, raw);
            },
            PropertyLayout::String | PropertyLayout::BinaryData => {
                ctx.string_field(name)?;
            },
            PropertyLayout::StringPair => {
                ctx.string_field(name)?;
                ctx.string_field(format!("{} value", name))?;
            },
        }
    }

    let consumed = ctx.position() - start_cursor_pos;
    if consumed != property_length {
        return Err(DecodeError::PropertyLengthMismatch { declared: property_length, consumed });
    }

    Ok(())
}

fn decode_connect(ctx: &mut DecodeContext) -> Result<(), DecodeError> {
    ctx.string_field("protocol name")?;
    ctx.byte_field("protocol level")?;
    let connect_flags = ctx.byte_field("connect flags")?;
    ctx.two_byte_field("keep alive")?;

    if ctx.is_v5() {
        decode_properties(ctx, "properties length")?;
    }

    // Start payload
    ctx.string_field("client identifier")?;

    let has_will = connect_flags & 0b0000_0100 == 0b0000_0100;
    let has_password = connect_flags & 0b0100_0000 == 0b0100_0000;
    let has_user_name = connect_flags & 0b1000_0000 == 0b1000_0000;

    if has_will {
        if ctx.is_v5() {
            decode_properties(ctx, "will properties length")?;
        }

        ctx.string_field("will topic")?;
        ctx.binary_field("will payload")?;
    }

    if has_user_name {
        ctx.string_field("user name")?;
    }

    if has_password {
        ctx.binary_field("password")?;
    }

    Ok(())
}

fn decode_connect_ack(ctx: &mut DecodeContext) -> Result<(), DecodeError> {
    ctx.byte_field("acknowledge flags")?;

    if ctx.is_v5() {
        ctx.byte_field("reason code")?;

        if ctx.remaining() > 0 {
            decode_properties(ctx, "properties length")?;
        }
    } else {
        ctx.byte_field("return code")?;
    }

    Ok(())
}

fn decode_publish(ctx: &mut DecodeContext, first_byte: u8) -> Result<(), DecodeError> {
    ctx.string_field("topic name")?;

    let qos = (first_byte & 0b0000_0110) >> 1;
    if qos != 0 {
        ctx.two_byte_field("packet identifier")?;
    }

    if ctx.is_v5() {
        decode_properties(ctx, "properties length")?;
    }

    let payload = ctx.take(ctx.remaining())?;
    ctx.specific("payload", payload);

    Ok(())
}

/// PUBACK, PUBREC, PUBREL and PUBCOMP share one layout.
fn decode_publish_response(
    ctx: &mut DecodeContext,
    remaining_packet_length: u32,
) -> Result<(), DecodeError> {
    ctx.two_byte_field("packet identifier")?;

    if ctx.is_v5() && remaining_packet_length > 2 {
        ctx.byte_field("reason code")?;

        if remaining_packet_length >= 4 {
            decode_properties(ctx, "properties length")?;
        }
    }

    Ok(())
}

fn decode_subscribe(ctx: &mut DecodeContext) -> Result<(), DecodeError> {
    ctx.two_byte_field("packet identifier")?;

    if ctx.is_v5() {
        decode_properties(ctx, "properties length")?;
    }

    let mut topic_num = 0;
    while ctx.remaining() > 0 {
        ctx.string_field(format!("topic {}", topic_num))?;
        ctx.byte_field(format!("subscription options {}", topic_num))?;
        topic_num += 1;
    }

    Ok(())
}

fn decode_subscribe_ack(ctx: &mut DecodeContext) -> Result<(), DecodeError> {
    ctx.two_byte_field("packet identifier")?;

    if ctx.is_v5() {
        decode_properties(ctx, "properties length")?;
    }

    decode_reason_codes(ctx)
}

fn decode_unsubscribe(ctx: &mut DecodeContext) -> Result<(), DecodeError> {
    ctx.two_byte_field("packet identifier")?;

    if ctx.is_v5() {
        decode_properties(ctx, "properties length")?;
    }

    let mut topic_num = 0;
    while ctx.remaining() > 0 {
        ctx.string_field(format!("topic {}", topic_num))?;
        topic_num += 1;
    }

    Ok(())
}

fn decode_unsubscribe_ack(ctx: &mut DecodeContext) -> Result<(), DecodeError> {
    ctx.two_byte_field("packet identifier")?;

    // MQTT 3.1.1 UNSUBACK carries nothing after the packet identifier
    if ctx.is_v5() {
        decode_properties(ctx, "properties length")?;
        decode_reason_codes(ctx)?;
    }

    Ok(())
}

fn decode_reason_codes(ctx: &mut DecodeContext) -> Result<(), DecodeError> {
    let mut code_num = 0;
    while ctx.remaining() > 0 {
        ctx.byte_field(format!("reason code {}", code_num))?;
        code_num += 1;
    }

    Ok(())
}

/// DISCONNECT and AUTH: an optional reason code, then optional properties.
fn decode_reason_and_properties(
    ctx: &mut DecodeContext,
    remaining_packet_length: u32,
) -> Result<(), DecodeError> {
    if !ctx.is_v5() || remaining_packet_length == 0 {
        return Ok(());
    }

    ctx.byte_field("reason code")?;

    if remaining_packet_length >= 2 {
        decode_properties(ctx, "properties length")?;
    }

    Ok(())
}

fn decode_body(
    ctx: &mut DecodeContext,
    packet_type: PacketType,
    remaining_packet_length: u32,
    first_byte: u8,
) -> Result<(), DecodeError> {
    match packet_type {
        PacketType::Connect => decode_connect(ctx),
        PacketType::ConnectAck => decode_connect_ack(ctx),
        PacketType::Publish => decode_publish(ctx, first_byte),
        PacketType::PublishAck
        | PacketType::PublishReceived
        | PacketType::PublishRelease
        | PacketType::PublishComplete => decode_publish_response(ctx, remaining_packet_length),
        PacketType::Subscribe => decode_subscribe(ctx),
        PacketType::SubscribeAck => decode_subscribe_ack(ctx),
        PacketType::Unsubscribe => decode_unsubscribe(ctx),
        PacketType::UnsubscribeAck => decode_unsubscribe_ack(ctx),
        PacketType::PingRequest | PacketType::PingResponse => Ok(()),
        PacketType::Disconnect | PacketType::Authenticate => {
            decode_reason_and_properties(ctx, remaining_packet_length)
        },
    }
}

/// Decodes the first packet in `bytes`. Bytes after that packet are ignored;
/// [`DecodedFields::packet_len`] says where it ended.
pub fn decode_packet(
    bytes: &[u8],
    protocol_version: ProtocolVersion,
) -> Result<DecodedFields, DecodeError> {
    let mut ctx = DecodeContext::new(bytes, protocol_version);

    let fixed_header = ctx.take(1)?;
    let first_byte = fixed_header[0];
    let packet_type = PacketType::from_fixed_header(first_byte)?;

    // AUTH only exists from MQTT 5 onwards
    if packet_type == PacketType::Authenticate && protocol_version == ProtocolVersion::V311 {
        return Err(DecodeError::InvalidPacketType(packet_type as u8));
    }

    ctx.universal("fixed header", fixed_header);

    let (remaining_packet_length, raw_length) = ctx.read_variable_int()?;
    ctx.universal("remaining length", raw_length);

    let packet_len = ctx.position() + remaining_packet_length as usize;
    if packet_len > bytes.len() {
        return Err(DecodeError::IncompletePacket { declared: packet_len, available: bytes.len() });
    }

    ctx.end = packet_len;

    decode_body(&mut ctx, packet_type, remaining_packet_length, first_byte)?;

    if ctx.remaining() > 0 {
        return Err(DecodeError::TrailingBytes { count: ctx.remaining() });
    }

    Ok(ctx.finish(packet_type, packet_len))
}

/// Decodes a hex string holding exactly one packet.
pub fn decode_hex(
    payload: &str,
    protocol_version: ProtocolVersion,
) -> Result<DecodedFields, DecodeError> {
    let bytes = hex::decode(payload.trim()).map_err(|_| DecodeError::InvalidHex)?;
    let fields = decode_packet(&bytes, protocol_version)?;

    if fields.packet_len < bytes.len() {
        return Err(DecodeError::TrailingBytes { count: bytes.len() - fields.packet_len });
    }

    Ok(fields)
}

/// Decodes consecutive packets until the stream ends or one fails to decode.
/// A failure is the last element of the returned list.
pub fn decode_session(
    bytes: &[u8],
    protocol_version: ProtocolVersion,
) -> Vec<Result<DecodedFields, DecodeError>> {
    let mut results = vec![];
    let mut offset = 0;

    while offset < bytes.len() {
        match decode_packet(&bytes[offset..], protocol_version) {
            Ok(fields) => {
                offset += fields.packet_len;
                results.push(Ok(fields));
            },
            Err(e) => {
                results.push(Err(e));
                break;
            },
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use crate::{
        decoder::*,
        encoder::{encode_string, encode_variable_int, frame_packet, MAX_VARIABLE_INT},
        types::{DecodeError, PacketType, ProtocolVersion},
    };
    use bytes::{BufMut, BytesMut};
    use proptest::prelude::*;

    fn v5(hex: &str) -> Result<DecodedFields, DecodeError> {
        decode_hex(hex, ProtocolVersion::V500)
    }

    #[test]
    fn test_invalid_remaining_length() {
        // Discovered from fuzz test
        let result = decode_packet(&[136, 1, 0, 36, 0, 0], ProtocolVersion::V500);
        assert!(matches!(
            result,
            Err(DecodeError::CursorOverrun { position: 2, needed: 2, end: 3 })
        ));
    }

    #[test]
    fn test_decode_variable_int() {
        fn normal_test(encoded_variable_int: &[u8], expected_variable_int: u32) {
            match decode_variable_int(encoded_variable_int) {
                Ok(Some((value, len))) => {
                    assert_eq!(value, expected_variable_int);
                    assert_eq!(len, encoded_variable_int.len());
                },
                Ok(None) => panic!("variable_int is None"),
                Err(err) => panic!("Error decoding variable int: {:?}", err),
            }
        }

        // Digits 1
        normal_test(&[0x00], 0);
        normal_test(&[0x7F], 127);

        // Digits 2
        normal_test(&[0x80, 0x01], 128);
        normal_test(&[0xFF, 0x7F], 16383);

        // Digits 3
        normal_test(&[0x80, 0x80, 0x01], 16384);
        normal_test(&[0xFF, 0xFF, 0x7F], 2097151);

        // Digits 4
        normal_test(&[0x80, 0x80, 0x80, 0x01], 2097152);
        normal_test(&[0xFF, 0xFF, 0xFF, 0x7F], 268435455);

        assert!(matches!(decode_variable_int(&[0x80, 0x80]), Ok(None)));
    }

    #[test]
    fn test_decode_variable_int_crash() {
        let number: u32 = u32::MAX;
        let result = decode_variable_int(&number.to_be_bytes());
        assert!(matches!(result, Err(DecodeError::InvalidVariableInt)));

        let result = decode_packet(&[0x30, 0xff, 0xff, 0xff, 0xff, 0x01], ProtocolVersion::V500);
        assert!(matches!(result, Err(DecodeError::InvalidVariableInt)));
    }

    proptest! {
        #[test]
        fn variable_int_round_trip(value in 0..=MAX_VARIABLE_INT) {
            let mut bytes = BytesMut::new();
            let len = encode_variable_int(value, &mut bytes);
            let decoded = decode_variable_int(&bytes).unwrap();
            prop_assert_eq!(decoded, Some((value, len)));
        }

        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_packet(&bytes, ProtocolVersion::V500);
            let _ = decode_packet(&bytes, ProtocolVersion::V311);
        }
    }

    #[test]
    fn test_decode_connect_fixed_header() {
        let connect = "1012\
                       00044d515454\
                       05\
                       02\
                       003c\
                       00\
                       00056162636465";
        let fields = v5(connect).unwrap();

        assert_eq!(fields.packet_type, PacketType::Connect);
        assert_eq!(fields.packet_len, 20);
        assert_eq!(fields.universal.hex("fixed header").unwrap(), "10");
        assert_eq!(fields.universal.hex("remaining length").unwrap(), "12");
        assert_eq!(fields.universal.len(), 2);

        assert_eq!(fields.specific.hex("protocol name").unwrap(), "4d515454");
        assert_eq!(fields.specific.hex("protocol level").unwrap(), "05");
        assert_eq!(fields.specific.hex("connect flags").unwrap(), "02");
        assert_eq!(fields.specific.hex("keep alive").unwrap(), "003c");
        assert_eq!(fields.specific.hex("properties length").unwrap(), "00");
        assert_eq!(fields.specific.hex("client identifier").unwrap(), "6162636465");
        assert!(fields.specific.get("will topic").is_none());
    }

    #[test]
    fn test_decode_connect_with_will_and_credentials() {
        let mut body = BytesMut::new();
        encode_string("MQTT", &mut body);
        body.put_u8(5);
        body.put_u8(0b1100_0110);
        body.put_u16(60);
        body.put_u8(0); // properties
        encode_string("c", &mut body);
        body.put_slice(&[0x05, 0x18, 0x00, 0x00, 0x00, 0x0a]); // will delay interval
        encode_string("w", &mut body);
        encode_string("bye", &mut body);
        encode_string("user", &mut body);
        encode_string("pass", &mut body);

        let packet = frame_packet(0x10, &body);
        let fields = decode_packet(&packet, ProtocolVersion::V500).unwrap();

        assert_eq!(fields.specific.hex("will properties length").unwrap(), "05");
        assert_eq!(fields.specific.hex("will delay interval").unwrap(), "0000000a");
        assert_eq!(fields.specific.hex("will topic").unwrap(), "77");
        assert_eq!(fields.specific.hex("will payload").unwrap(), "627965");
        assert_eq!(fields.specific.hex("user name").unwrap(), "75736572");
        assert_eq!(fields.specific.hex("password").unwrap(), "70617373");
    }

    #[test]
    fn test_decode_connect_v311_has_no_properties() {
        let fields =
            decode_hex("101000044d5154540402003c0003616263ff", ProtocolVersion::V311);
        assert!(matches!(fields, Err(DecodeError::TrailingBytes { count: 1 })));

        let fields =
            decode_hex("100f00044d5154540402003c0003616263", ProtocolVersion::V311).unwrap();
        assert_eq!(fields.specific.hex("client identifier").unwrap(), "616263");
        assert!(fields.specific.get("properties length").is_none());
    }

    #[test]
    fn test_decode_subscribe_scenario() {
        let packet = "8208\
                      0001\
                      0003612f62\
                      00";
        let fields = decode_hex(packet, ProtocolVersion::V311).unwrap();

        assert_eq!(fields.packet_type, PacketType::Subscribe);
        assert_eq!(fields.packet_len, 10);
        assert_eq!(fields.specific.hex("packet identifier").unwrap(), "0001");
        assert_eq!(fields.specific.hex("topic 0").unwrap(), "612f62");
        assert_eq!(fields.specific.hex("subscription options 0").unwrap(), "00");
        assert_eq!(fields.specific.len(), 3);
    }

    #[test]
    fn test_decode_subscribe() {
        // Subscribe packet *without* Subscription Identifier
        let fields = decode_packet(
            &[0x82, 0x0a, 0x00, 0x01, 0x00, 0x00, 0x04, 0x74, 0x65, 0x73, 0x74, 0x00],
            ProtocolVersion::V500,
        )
        .unwrap();
        assert_eq!(fields.specific.hex("properties length").unwrap(), "00");
        assert_eq!(fields.specific.hex("topic 0").unwrap(), "74657374");
        assert!(fields.specific.get("subscription identifier").is_none());

        // Subscribe packet with Subscription Identifier
        let fields = decode_packet(
            &[0x82, 0x0c, 0xff, 0xf6, 0x02, 0x0b, 0x01, 0x00, 0x04, 0x74, 0x65, 0x73, 0x74, 0x02],
            ProtocolVersion::V500,
        )
        .unwrap();
        assert_eq!(fields.specific.hex("packet identifier").unwrap(), "fff6");
        assert_eq!(fields.specific.hex("subscription identifier").unwrap(), "01");
        assert_eq!(fields.specific.hex("subscription options 0").unwrap(), "02");
    }

    #[test]
    fn test_decode_publish() {
        let mut body = BytesMut::new();
        encode_string("a/b", &mut body);
        body.put_u16(7);
        // payload format indicator, message expiry interval, content type,
        // response topic, correlation data, two user properties
        let properties: &[u8] = &[
            0x01, 0x01, 0x02, 0x00, 0x00, 0x00, 0x3c, 0x03, 0x00, 0x01, b't', 0x08, 0x00, 0x01,
            b'r', 0x09, 0x00, 0x02, 0xbe, 0xef, 0x26, 0x00, 0x01, b'k', 0x00, 0x01, b'v', 0x26,
            0x00, 0x01, b'x', 0x00, 0x01, b'y',
        ];
        body.put_u8(properties.len() as u8);
        body.put_slice(properties);
        body.put_slice(b"hello");

        let packet = frame_packet(0x32, &body);
        let fields = decode_packet(&packet, ProtocolVersion::V500).unwrap();

        assert_eq!(fields.specific.hex("topic name").unwrap(), "612f62");
        assert_eq!(fields.specific.hex("packet identifier").unwrap(), "0007");
        assert_eq!(fields.specific.hex("payload format indicator").unwrap(), "01");
        assert_eq!(fields.specific.hex("message expiry interval").unwrap(), "0000003c");
        assert_eq!(fields.specific.hex("content type").unwrap(), "74");
        assert_eq!(fields.specific.hex("response topic").unwrap(), "72");
        assert_eq!(fields.specific.hex("correlation data").unwrap(), "beef");
        assert_eq!(fields.specific.hex("user property").unwrap(), "6b");
        assert_eq!(fields.specific.hex("user property value").unwrap(), "76");
        assert_eq!(fields.specific.hex("user property 1").unwrap(), "78");
        assert_eq!(fields.specific.hex("user property value 1").unwrap(), "79");
        assert_eq!(fields.specific.hex("payload").unwrap(), "68656c6c6f");
    }

    #[test]
    fn test_decode_publish_qos0_has_no_packet_id() {
        let fields = v5("3006 0001 61 00 6869".replace(' ', "").as_str()).unwrap();
        assert!(fields.specific.get("packet identifier").is_none());
        assert_eq!(fields.specific.hex("payload").unwrap(), "6869");

        let result = v5("3005000161006869");
        assert!(matches!(result, Err(DecodeError::TrailingBytes { count: 1 })));
    }

    #[test]
    fn test_decode_connect_ack_properties() {
        // session expiry interval, assigned client identifier, server keep alive
        let fields =
            v5("2010 0000 0d 1100000078 120002 6964 13001e".replace(' ', "").as_str()).unwrap();

        assert_eq!(fields.packet_type, PacketType::ConnectAck);
        assert_eq!(fields.specific.hex("acknowledge flags").unwrap(), "00");
        assert_eq!(fields.specific.hex("reason code").unwrap(), "00");
        assert_eq!(fields.specific.hex("properties length").unwrap(), "0d");
        assert_eq!(fields.specific.hex("session expiry interval").unwrap(), "00000078");
        assert_eq!(fields.specific.hex("assigned client identifier").unwrap(), "6964");
        assert_eq!(fields.specific.hex("server keep alive").unwrap(), "001e");

        let fields = decode_hex("20020000", ProtocolVersion::V311).unwrap();
        assert_eq!(fields.specific.hex("return code").unwrap(), "00");
    }

    #[test]
    fn test_decode_publish_responses() {
        let fields = v5("40020001").unwrap();
        assert_eq!(fields.packet_type, PacketType::PublishAck);
        assert_eq!(fields.specific.len(), 1);

        let fields = v5("5003000110").unwrap();
        assert_eq!(fields.packet_type, PacketType::PublishReceived);
        assert_eq!(fields.specific.hex("reason code").unwrap(), "10");

        let fields = v5("6204000192 00".replace(' ', "").as_str()).unwrap();
        assert_eq!(fields.packet_type, PacketType::PublishRelease);
        assert_eq!(fields.specific.hex("properties length").unwrap(), "00");

        let fields = decode_hex("70030001aa", ProtocolVersion::V311);
        assert!(matches!(fields, Err(DecodeError::TrailingBytes { count: 1 })));
    }

    #[test]
    fn test_decode_acks_with_reason_codes() {
        let fields = v5("9005 0001 00 0180".replace(' ', "").as_str()).unwrap();
        assert_eq!(fields.packet_type, PacketType::SubscribeAck);
        assert_eq!(fields.specific.hex("reason code 0").unwrap(), "01");
        assert_eq!(fields.specific.hex("reason code 1").unwrap(), "80");

        let fields = decode_hex("b0020001", ProtocolVersion::V311).unwrap();
        assert_eq!(fields.packet_type, PacketType::UnsubscribeAck);
        assert_eq!(fields.specific.len(), 1);

        let fields = v5("b004 0001 00 11".replace(' ', "").as_str()).unwrap();
        assert_eq!(fields.specific.hex("reason code 0").unwrap(), "11");
    }

    #[test]
    fn test_decode_unsubscribe() {
        let fields = v5("a20c 0002 00 000161 0005 612f2b2f".replace(' ', "").as_str());
        assert!(matches!(fields, Err(DecodeError::CursorOverrun { .. })));

        let fields = v5("a20b 0002 00 000161 0003 612f23".replace(' ', "").as_str()).unwrap();
        assert_eq!(fields.specific.hex("topic 0").unwrap(), "61");
        assert_eq!(fields.specific.hex("topic 1").unwrap(), "612f23");
    }

    #[test]
    fn test_decode_empty_bodies() {
        assert_eq!(v5("c000").unwrap().packet_type, PacketType::PingRequest);
        assert_eq!(v5("d000").unwrap().packet_type, PacketType::PingResponse);

        let fields = v5("e000").unwrap();
        assert_eq!(fields.packet_type, PacketType::Disconnect);
        assert!(fields.specific.is_empty());

        let fields = v5("e0028e00").unwrap();
        assert_eq!(fields.specific.hex("reason code").unwrap(), "8e");

        assert!(matches!(v5("c00100"), Err(DecodeError::TrailingBytes { count: 1 })));
    }

    #[test]
    fn test_repeated_properties_are_numbered() {
        let count = 2000;
        let mut properties = BytesMut::new();
        for _ in 0..count {
            properties.put_slice(&[0x0b, 0x01]);
        }

        let mut body = BytesMut::new();
        body.put_u8(0x00);
        encode_variable_int(properties.len() as u32, &mut body);
        body.put_slice(&properties);
        let packet = frame_packet(0xe0, &body);

        let started = std::time::Instant::now();
        let fields = decode_packet(&packet, ProtocolVersion::V500).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        assert_eq!(fields.packet_len, packet.len());
        assert_eq!(fields.specific.hex("subscription identifier").unwrap(), "01");
        assert_eq!(fields.specific.hex("subscription identifier 1").unwrap(), "01");
        assert_eq!(fields.specific.hex("subscription identifier 1999").unwrap(), "01");
        assert!(fields.specific.get("subscription identifier 2000").is_none());
        // reason code, properties length and every identifier
        assert_eq!(fields.specific.len(), count + 2);
    }

    #[test]
    fn test_decode_authenticate() {
        // authentication method "m", authentication data 0x01
        let fields = v5("f00a 18 08 150001 6d 160001 01".replace(' ', "").as_str()).unwrap();
        assert_eq!(fields.packet_type, PacketType::Authenticate);
        assert_eq!(fields.specific.hex("reason code").unwrap(), "18");
        assert_eq!(fields.specific.hex("authentication method").unwrap(), "6d");
        assert_eq!(fields.specific.hex("authentication data").unwrap(), "01");

        let result = decode_hex("f000", ProtocolVersion::V311);
        assert!(matches!(result, Err(DecodeError::InvalidPacketType(15))));
    }

    #[test]
    fn test_unknown_property_id() {
        let result = v5("e003 00 01 04".replace(' ', "").as_str());
        assert!(matches!(result, Err(DecodeError::InvalidPropertyId(0x04))));
    }

    #[test]
    fn test_property_block_boundary() {
        // Declared 3 bytes of properties, but the session expiry interval takes 5
        let result = v5("e008 00 03 1100000078 00".replace(' ', "").as_str());
        assert!(matches!(
            result,
            Err(DecodeError::PropertyLengthMismatch { declared: 3, consumed: 5 })
        ));

        // Declared 5 bytes, one property of exactly 5 bytes
        let fields = v5("e007 00 05 1100000078".replace(' ', "").as_str()).unwrap();
        assert_eq!(fields.specific.hex("session expiry interval").unwrap(), "00000078");
        assert_eq!(fields.packet_len, 9);

        // Declared length runs past the packet
        let result = v5("e003 00 05 11".replace(' ', "").as_str());
        assert!(matches!(
            result,
            Err(DecodeError::CursorOverrun { position: 4, needed: 5, end: 5 })
        ));
    }

    #[test]
    fn test_cursor_overrun_and_incomplete() {
        // A string length running past the declared end
        let result = decode_hex("82050001000961", ProtocolVersion::V311);
        assert!(matches!(result, Err(DecodeError::CursorOverrun { .. })));

        let result = v5("8210000100");
        assert!(matches!(
            result,
            Err(DecodeError::IncompletePacket { declared: 18, available: 5 })
        ));

        for truncated in [&[][..], &[0x30, 0x80][..]] {
            let result = decode_packet(truncated, ProtocolVersion::V500);
            assert!(matches!(result, Err(DecodeError::CursorOverrun { .. })));
        }
        assert!(matches!(v5("zz"), Err(DecodeError::InvalidHex)));
        assert!(matches!(v5("0000"), Err(DecodeError::InvalidPacketType(0))));
    }

    #[test]
    fn test_decode_session() {
        let mut stream = BytesMut::new();
        stream.put_slice(&hex::decode("c000").unwrap());
        stream.put_slice(&hex::decode("40020001").unwrap());
        stream.put_slice(&hex::decode("e0").unwrap());

        let results = decode_session(&stream, ProtocolVersion::V500);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().packet_type, PacketType::PingRequest);
        assert_eq!(results[1].as_ref().unwrap().packet_type, PacketType::PublishAck);
        assert!(matches!(results[2], Err(DecodeError::CursorOverrun { .. })));

        assert!(decode_session(&[], ProtocolVersion::V500).is_empty());
    }

    #[test]
    fn test_peek_packet_len() {
        assert_eq!(peek_packet_len(&[]).unwrap(), None);
        assert_eq!(peek_packet_len(&[0x30]).unwrap(), None);
        assert_eq!(peek_packet_len(&[0x30, 0x80]).unwrap(), None);
        assert_eq!(peek_packet_len(&[0x30, 0x02]).unwrap(), Some(4));
        assert_eq!(peek_packet_len(&[0x30, 0x80, 0x01]).unwrap(), Some(131));
        assert!(peek_packet_len(&[0x30, 0xff, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_display() {
        let fields = v5("e0028e00").unwrap();
        let rendered = fields.to_string();
        assert!(rendered.starts_with("DISCONNECT (4 bytes)"));
        assert!(rendered.contains("  fixed header: e0\n"));
        assert!(rendered.contains("  reason code: 8e\n"));
    }
}
