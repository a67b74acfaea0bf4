//! Seed packet pools, one per control packet type.
//!
//! On disk a corpus is a directory holding one file per packet type, named
//! after the type (`CONNECT`, `PUBLISH`, ...). Each non-blank line of a file
//! is one packet written as hex.

use crate::types::{FuzzError, PacketType};
use bytes::Bytes;
use rand::{seq::SliceRandom, Rng};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("failed to read corpus at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}:{line}: {reason}")]
    InvalidLine { path: PathBuf, line: usize, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pools: BTreeMap<PacketType, Vec<Bytes>>,
}

/// Parses newline separated hex packets, skipping blank lines. On failure
/// returns the 1-based line number and the reason.
pub fn parse_pool(text: &str) -> Result<Vec<Bytes>, (usize, String)> {
    let mut packets = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        match hex::decode(line) {
            Ok(packet) => packets.push(Bytes::from(packet)),
            Err(e) => return Err((index + 1, e.to_string())),
        }
    }

    Ok(packets)
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every file in `dir` whose name is a packet type name. Other
    /// files are ignored; a file with no packets leaves its pool absent.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, CorpusError> {
        let dir = dir.as_ref();
        let mut corpus = Corpus::new();

        for packet_type in PacketType::ALL {
            let path = dir.join(packet_type.name());

            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(CorpusError::Io { path, source }),
            };

            let packets = parse_pool(&text)
                .map_err(|(line, reason)| CorpusError::InvalidLine { path, line, reason })?;

            for packet in packets {
                corpus.insert(packet_type, packet);
            }
        }

        if corpus.is_empty() && !dir.is_dir() {
            return Err(CorpusError::Io {
                path: dir.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "corpus directory not found"),
            });
        }

        Ok(corpus)
    }

    pub fn insert(&mut self, packet_type: PacketType, packet: impl Into<Bytes>) {
        self.pools.entry(packet_type).or_default().push(packet.into());
    }

    /// Builds a corpus from `(type, hex)` pairs.
    pub fn from_hex<'a, I>(entries: I) -> Result<Self, hex::FromHexError>
    where
        I: IntoIterator<Item = (PacketType, &'a str)>,
    {
        let mut corpus = Corpus::new();

        for (packet_type, packet) in entries {
            corpus.insert(packet_type, hex::decode(packet)?);
        }

        Ok(corpus)
    }

    pub fn pool(&self, packet_type: PacketType) -> &[Bytes] {
        self.pools.get(&packet_type).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, packet_type: PacketType) -> bool {
        !self.pool(packet_type).is_empty()
    }

    /// Packet types with at least one seed, in packet type order.
    pub fn packet_types(&self) -> impl Iterator<Item = PacketType> + '_ {
        self.pools.iter().filter(|(_, pool)| !pool.is_empty()).map(|(packet_type, _)| *packet_type)
    }

    pub fn is_empty(&self) -> bool {
        self.packet_types().next().is_none()
    }

    /// Picks one seed uniformly from the pool of `packet_type`.
    pub fn select<R: Rng + ?Sized>(
        &self,
        packet_type: PacketType,
        rng: &mut R,
    ) -> Result<Bytes, FuzzError> {
        self.pool(packet_type)
            .choose(rng)
            .cloned()
            .ok_or(FuzzError::CorpusExhaustion(packet_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decoder::decode_packet, types::ProtocolVersion};
    use rand::{rngs::StdRng, SeedableRng};
    use std::{env, process};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("mqtt-fuzz-corpus-{}-{}", name, process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn parse_skips_blank_lines() {
        let pool = parse_pool("e000\n\n  \ne0021000\n").unwrap();
        assert_eq!(
            pool,
            vec![Bytes::from_static(&[0xe0, 0x00]), Bytes::from_static(&[0xe0, 0x02, 0x10, 0x00])]
        );
    }

    #[test]
    fn parse_rejects_bad_lines() {
        assert_eq!(parse_pool("e000\ne00").unwrap_err().0, 2);
        assert_eq!(parse_pool("\n\nzz").unwrap_err().0, 3);
    }

    #[test]
    fn select_from_missing_pool_is_exhaustion() {
        let corpus =
            Corpus::from_hex([(PacketType::Connect, "100d00044d5154540502003c000000")]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        assert!(corpus.select(PacketType::Connect, &mut rng).is_ok());
        assert!(matches!(
            corpus.select(PacketType::Publish, &mut rng),
            Err(FuzzError::CorpusExhaustion(PacketType::Publish))
        ));
    }

    #[test]
    fn selection_is_seeded() {
        let corpus = Corpus::from_hex([
            (PacketType::Disconnect, "e000"),
            (PacketType::Disconnect, "e00100"),
            (PacketType::Disconnect, "e0020000"),
        ])
        .unwrap();

        let pick = |seed| {
            corpus.select(PacketType::Disconnect, &mut StdRng::seed_from_u64(seed)).unwrap()
        };

        for seed in 0..20 {
            assert_eq!(pick(seed), pick(seed));
        }
    }

    #[test]
    fn packet_types_are_ordered() {
        let corpus = Corpus::from_hex([
            (PacketType::Disconnect, "e000"),
            (PacketType::Connect, "1000"),
            (PacketType::Publish, "3000"),
        ])
        .unwrap();

        let types: Vec<_> = corpus.packet_types().collect();
        assert_eq!(types, vec![PacketType::Connect, PacketType::Publish, PacketType::Disconnect]);
    }

    #[test]
    fn loads_directory() {
        let dir = scratch_dir("load");
        fs::write(dir.join("CONNECT"), "100d00044d5154540502003c000000\n").unwrap();
        fs::write(dir.join("DISCONNECT"), "e000\n\ne0021000\n").unwrap();
        fs::write(dir.join("README"), "not a packet\n").unwrap();

        let corpus = Corpus::from_dir(&dir).unwrap();
        assert_eq!(corpus.pool(PacketType::Connect).len(), 1);
        assert_eq!(corpus.pool(PacketType::Disconnect).len(), 2);
        assert!(!corpus.contains(PacketType::Publish));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn reports_bad_line_location() {
        let dir = scratch_dir("bad-line");
        fs::write(dir.join("PUBLISH"), "3000\n30g0\n").unwrap();

        match Corpus::from_dir(&dir) {
            Err(CorpusError::InvalidLine { path, line, .. }) => {
                assert_eq!(path, dir.join("PUBLISH"));
                assert_eq!(line, 2);
            },
            other => panic!("expected an invalid line, got {:?}", other),
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn bundled_corpus_decodes() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../mqtt_corpus");
        let corpus = Corpus::from_dir(dir).unwrap();

        for packet_type in crate::fuzzer::REQUIRED_PACKET_TYPES {
            assert!(corpus.contains(packet_type), "no {} seeds", packet_type);
        }

        for packet_type in corpus.packet_types() {
            for packet in corpus.pool(packet_type) {
                let fields = decode_packet(packet, ProtocolVersion::V500).unwrap();
                assert_eq!(fields.packet_type, packet_type);
                assert_eq!(fields.packet_len, packet.len());
            }
        }
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = env::temp_dir().join("mqtt-fuzz-corpus-does-not-exist");
        assert!(matches!(Corpus::from_dir(dir), Err(CorpusError::Io { .. })));
    }
}
