//! Orders mutated packets into the byte stream sent in one attempt.

use crate::{
    types::{FuzzError, PacketType},
    MAX_CONSTRUCT_INTENSITY,
};
use bytes::{Bytes, BytesMut};
use num_enum::TryFromPrimitive;
use rand::{seq::SliceRandom, Rng};
use std::{collections::BTreeMap, fmt};

/// How far a session strays from a well formed connect, publish, disconnect
/// exchange.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive)]
pub enum ConstructIntensity {
    /// CONNECT, PUBLISH, DISCONNECT.
    Level0 = 0,
    /// CONNECT first and DISCONNECT last, the rest repeated and shuffled.
    Level1 = 1,
    /// CONNECT first, then a random draw of the other types.
    Level2 = 2,
    /// Any packets in any order, possibly none.
    Level3 = 3,
}

impl ConstructIntensity {
    /// Clamps out of range values into `0..=3`.
    pub fn new(value: i64) -> Self {
        let level = value.clamp(0, MAX_CONSTRUCT_INTENSITY as i64) as u8;
        ConstructIntensity::try_from(level).unwrap_or(ConstructIntensity::Level0)
    }

    pub fn value(&self) -> u8 {
        *self as u8
    }

    /// The next level, wrapping from 3 back to 0.
    pub fn cycle(&self) -> Self {
        ConstructIntensity::new(((self.value() + 1) % (MAX_CONSTRUCT_INTENSITY + 1)) as i64)
    }
}

impl Default for ConstructIntensity {
    fn default() -> Self {
        ConstructIntensity::Level0
    }
}

impl fmt::Display for ConstructIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

fn packet(
    packets: &BTreeMap<PacketType, Vec<u8>>,
    packet_type: PacketType,
) -> Result<&[u8], FuzzError> {
    packets.get(&packet_type).map(Vec::as_slice).ok_or(FuzzError::CorpusExhaustion(packet_type))
}

fn concat<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Bytes {
    let mut stream = BytesMut::new();

    for part in parts {
        stream.extend_from_slice(part);
    }

    stream.freeze()
}

/// Builds a session stream from one packet per type.
///
/// Only level 0 is free of randomness. Missing packets that a level cannot
/// do without are reported as [`FuzzError::CorpusExhaustion`].
pub fn construct_session<R: Rng + ?Sized>(
    packets: &BTreeMap<PacketType, Vec<u8>>,
    level: ConstructIntensity,
    rng: &mut R,
) -> Result<Bytes, FuzzError> {
    match level {
        ConstructIntensity::Level0 => {
            let connect = packet(packets, PacketType::Connect)?;
            let publish = packet(packets, PacketType::Publish)?;
            let disconnect = packet(packets, PacketType::Disconnect)?;

            Ok(concat([connect, publish, disconnect]))
        },
        ConstructIntensity::Level1 => {
            let connect = packet(packets, PacketType::Connect)?;
            packet(packets, PacketType::Publish)?;
            let disconnect = packet(packets, PacketType::Disconnect)?;

            let mut middle = Vec::new();

            for (packet_type, bytes) in packets {
                match packet_type {
                    PacketType::Connect | PacketType::Disconnect | PacketType::Authenticate => {},
                    _ => {
                        for _ in 0..rng.gen_range(1..=3) {
                            middle.push(bytes.as_slice());
                        }
                    },
                }
            }

            middle.shuffle(rng);

            if let Some(auth) = packets.get(&PacketType::Authenticate) {
                let position = rng.gen_range(0..=middle.len());
                middle.insert(position, auth.as_slice());
            }

            let stream = std::iter::once(connect).chain(middle).chain(std::iter::once(disconnect));
            Ok(concat(stream))
        },
        ConstructIntensity::Level2 => {
            let connect = packet(packets, PacketType::Connect)?;

            let others: Vec<&[u8]> = packets
                .iter()
                .filter(|(packet_type, _)| **packet_type != PacketType::Connect)
                .map(|(_, bytes)| bytes.as_slice())
                .collect();

            let mut parts = vec![connect];

            if !others.is_empty() {
                for _ in 0..rng.gen_range(1..=5) {
                    parts.extend(others.choose(rng).copied());
                }
            }

            if let Some(disconnect) = packets.get(&PacketType::Disconnect) {
                if rng.gen_bool(0.5) {
                    parts.push(disconnect.as_slice());
                }
            }

            Ok(concat(parts))
        },
        ConstructIntensity::Level3 => {
            let all: Vec<&[u8]> = packets.values().map(Vec::as_slice).collect();

            if all.is_empty() {
                return Err(FuzzError::CorpusExhaustion(PacketType::Connect));
            }

            let mut parts = Vec::new();

            for _ in 0..rng.gen_range(0..=6) {
                parts.extend(all.choose(rng).copied());
            }

            Ok(concat(parts))
        },
    }
}
