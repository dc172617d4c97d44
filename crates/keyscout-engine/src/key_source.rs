//! Scalar sources feeding the producers.
//!
//! A source is shared between every producer that references its id, so all
//! variants are internally synchronized. Every scalar leaving a source has
//! been normalized into [1, n-1]; out-of-range draws become the fixed
//! substitute `2`.

use crate::config::{KeySourceConfig, KeySourceKind, ReplayFormat};
use bip39::Mnemonic;
use keyscout_types::address::decode_wif;
use keyscout_types::Scalar;
use log::warn;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeySourceError {
    #[error("cannot open replay file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A named producer of normalized scalars.
///
/// `next_base` feeds grid producers (one base per batch); `next_batch`
/// feeds producers that derive one scalar at a time. `None` / a short batch
/// signals end of input, which only file-backed sources ever do.
pub trait KeySource: Send + Sync {
    fn id(&self) -> &str;

    fn next_base(&self) -> Option<Scalar>;

    fn next_batch(&self, n: usize) -> Vec<Scalar> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            match self.next_base() {
                Some(scalar) => out.push(scalar),
                None => break,
            }
        }
        out
    }
}

/// Build a source from its configuration.
pub fn build(config: &KeySourceConfig) -> Result<Arc<dyn KeySource>, KeySourceError> {
    let id = config.id.clone();
    Ok(match &config.kind {
        KeySourceKind::SecureRandom => Arc::new(SecureRandomSource { id }),
        KeySourceKind::SeededRandom { seed } => Arc::new(SeededSource {
            id,
            rng: Mutex::new(StdRng::seed_from_u64(*seed)),
        }),
        KeySourceKind::BitMasked { bits, seed } => Arc::new(BitMaskedSource {
            id,
            bits: *bits,
            rng: seed.map(|s| Mutex::new(StdRng::seed_from_u64(s))),
        }),
        KeySourceKind::FileReplay { path, format } => {
            Arc::new(FileReplaySource::open(id, path, *format)?)
        }
    })
}

/// Draws every scalar from the operating system's cryptographic RNG.
pub struct SecureRandomSource {
    id: String,
}

impl KeySource for SecureRandomSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_base(&self) -> Option<Scalar> {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Some(Scalar::from_bytes(bytes).normalized())
    }
}

/// Deterministic PRNG source for tests and reproducible sweeps.
pub struct SeededSource {
    id: String,
    rng: Mutex<StdRng>,
}

impl KeySource for SeededSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_base(&self) -> Option<Scalar> {
        let mut bytes = [0u8; 32];
        self.rng.lock().unwrap().fill_bytes(&mut bytes);
        Some(Scalar::from_bytes(bytes).normalized())
    }
}

/// Random scalars with the top 256-k bits zeroed, shrinking the effective
/// key space to 2^k.
pub struct BitMaskedSource {
    id: String,
    bits: u32,
    /// Seeded PRNG when configured, otherwise the cryptographic RNG.
    rng: Option<Mutex<StdRng>>,
}

impl KeySource for BitMaskedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_base(&self) -> Option<Scalar> {
        let mut bytes = [0u8; 32];
        match &self.rng {
            Some(rng) => rng.lock().unwrap().fill_bytes(&mut bytes),
            None => OsRng.fill_bytes(&mut bytes),
        }
        Some(Scalar::from_bytes(bytes).masked(self.bits).normalized())
    }
}

/// Replays scalars from a text file, one per line, in a declared format.
/// Unparseable lines are logged and skipped; EOF ends the source.
pub struct FileReplaySource {
    id: String,
    format: ReplayFormat,
    lines: Mutex<std::io::Lines<BufReader<File>>>,
}

impl FileReplaySource {
    pub fn open(id: String, path: &Path, format: ReplayFormat) -> Result<Self, KeySourceError> {
        let file = File::open(path).map_err(|source| KeySourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            id,
            format,
            lines: Mutex::new(BufReader::new(file).lines()),
        })
    }

    fn parse(&self, line: &str) -> Option<Scalar> {
        let parsed = match self.format {
            ReplayFormat::Decimal => Scalar::from_decimal(line).ok(),
            ReplayFormat::Hex => Scalar::from_hex(line).ok(),
            ReplayFormat::Wif => decode_wif(line).ok(),
            ReplayFormat::Mnemonic => mnemonic_to_scalar(line),
        };
        if parsed.is_none() {
            warn!("key source {}: skipping unparseable line", self.id);
        }
        parsed
    }
}

impl KeySource for FileReplaySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_base(&self) -> Option<Scalar> {
        let mut lines = self.lines.lock().unwrap();
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    warn!("key source {}: read error, ending replay: {}", self.id, e);
                    return None;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some(scalar) = self.parse(trimmed) {
                return Some(scalar.normalized());
            }
        }
    }
}

/// BIP-39 mnemonic to scalar: seed with empty passphrase, first 32 bytes
/// interpreted big-endian.
fn mnemonic_to_scalar(line: &str) -> Option<Scalar> {
    let mnemonic = Mnemonic::parse_normalized(line).ok()?;
    let seed = mnemonic.to_seed("");
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&seed[..32]);
    Some(Scalar::from_bytes(bytes))
}
