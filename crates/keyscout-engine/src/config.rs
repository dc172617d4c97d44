//! The JSON configuration document and its startup validation.
//!
//! A single document drives every run; the top-level `command` selects the
//! mode and the matching section carries that mode's settings. Validation
//! runs before any component is constructed so that a bad document never
//! brings up a partial pipeline.

use crate::derive::MAX_GRID_BITS;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("command {0:?} requires a `{1}` section")]
    MissingSection(Command, &'static str),

    #[error("key source has an empty id")]
    EmptyKeySourceId,

    #[error("duplicate key source id \"{0}\"")]
    DuplicateKeySourceId(String),

    #[error("producer {index} references unknown key source \"{id}\"")]
    UnknownKeySource { index: usize, id: String },

    #[error("producer {index}: grid width {bits} exceeds the maximum of {MAX_GRID_BITS} bits")]
    GridTooWide { index: usize, bits: u32 },

    #[error("bit mask width {0} must be in 1..=256")]
    BadMaskBits(u32),

    #[error("no producers configured")]
    NoProducers,

    #[error("invalid vanity pattern: {0}")]
    BadPattern(#[from] regex::Error),
}

/// Top-level command selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Command {
    Find,
    AddressFilesToLMDB,
    LMDBToAddressFile,
    OpenCLInfo,
}

/// The whole configuration document.
#[derive(Debug, Deserialize)]
pub struct Document {
    pub command: Command,
    #[serde(default)]
    pub find: Option<FindConfig>,
    #[serde(default)]
    pub import: Option<ImportConfig>,
    #[serde(default)]
    pub export: Option<ExportConfig>,
}

impl Document {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: Document = serde_json::from_str(&raw)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Check that the selected command's section exists and is internally
    /// consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.command {
            Command::Find => self
                .find
                .as_ref()
                .ok_or(ConfigError::MissingSection(self.command, "find"))?
                .validate(),
            Command::AddressFilesToLMDB => {
                self.import
                    .as_ref()
                    .ok_or(ConfigError::MissingSection(self.command, "import"))?;
                Ok(())
            }
            Command::LMDBToAddressFile => {
                self.export
                    .as_ref()
                    .ok_or(ConfigError::MissingSection(self.command, "export"))?;
                Ok(())
            }
            Command::OpenCLInfo => Ok(()),
        }
    }
}

fn default_shutdown_deadline() -> u64 {
    10
}

/// Settings for the `Find` pipeline.
#[derive(Debug, Deserialize)]
pub struct FindConfig {
    pub key_sources: Vec<KeySourceConfig>,
    pub producers: Vec<ProducerConfig>,
    pub consumer: ConsumerConfig,
    /// Seconds to wait for the producer pool during shutdown before forcing
    /// termination.
    #[serde(default = "default_shutdown_deadline")]
    pub shutdown_deadline_secs: u64,
}

impl FindConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for source in &self.key_sources {
            if source.id.is_empty() {
                return Err(ConfigError::EmptyKeySourceId);
            }
            if !ids.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateKeySourceId(source.id.clone()));
            }
            if let KeySourceKind::BitMasked { bits, .. } = source.kind {
                if bits == 0 || bits > 256 {
                    return Err(ConfigError::BadMaskBits(bits));
                }
            }
        }

        if self.producers.is_empty() {
            return Err(ConfigError::NoProducers);
        }
        for (index, producer) in self.producers.iter().enumerate() {
            if !ids.contains(producer.key_source.as_str()) {
                return Err(ConfigError::UnknownKeySource {
                    index,
                    id: producer.key_source.clone(),
                });
            }
            if let Some(bits) = producer.kind.grid_bits() {
                if bits > MAX_GRID_BITS {
                    return Err(ConfigError::GridTooWide { index, bits });
                }
            }
        }

        if let Some(pattern) = &self.consumer.vanity_pattern {
            regex::Regex::new(pattern)?;
        }
        Ok(())
    }
}

/// A named scalar source. Producers reference it by id.
#[derive(Debug, Deserialize)]
pub struct KeySourceConfig {
    pub id: String,
    #[serde(flatten)]
    pub kind: KeySourceKind,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum KeySourceKind {
    /// Cryptographic RNG.
    SecureRandom,
    /// Deterministic PRNG for tests and reproducible sweeps.
    SeededRandom { seed: u64 },
    /// Random scalar with the top 256-k bits zeroed (puzzle-range search).
    /// Draws from the seeded PRNG when a seed is given, else from the
    /// cryptographic RNG.
    BitMasked {
        bits: u32,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Scalars replayed from a text file; ends at EOF.
    FileReplay { path: PathBuf, format: ReplayFormat },
}

/// Line format of a replay file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayFormat {
    Decimal,
    Hex,
    Wif,
    Mnemonic,
}

fn default_chunk_size() -> usize {
    1024
}

/// A producer definition: which source feeds it, how it derives, and
/// whether it stops after a single batch.
#[derive(Debug, Deserialize)]
pub struct ProducerConfig {
    pub key_source: String,
    #[serde(default)]
    pub run_once: bool,
    #[serde(flatten)]
    pub kind: ProducerKind,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProducerKind {
    /// Grid derivation on the CPU back-end: one base per batch, 2^bits keys.
    Cpu {
        #[serde(default = "default_grid_bits")]
        grid_bits: u32,
    },
    /// One scalar at a time from the source, derived independently. The
    /// natural pairing for file-replay sources.
    FileReplay {
        #[serde(default = "default_chunk_size")]
        chunk_size: usize,
    },
    /// Grid derivation on an OpenCL device.
    Gpu {
        #[serde(default)]
        device: usize,
        #[serde(default = "default_grid_bits")]
        grid_bits: u32,
        #[serde(default)]
        on_bist_failure: BistPolicy,
    },
}

fn default_grid_bits() -> u32 {
    16
}

impl ProducerKind {
    pub fn grid_bits(&self) -> Option<u32> {
        match self {
            ProducerKind::Cpu { grid_bits } | ProducerKind::Gpu { grid_bits, .. } => {
                Some(*grid_bits)
            }
            ProducerKind::FileReplay { .. } => None,
        }
    }
}

/// What to do when a GPU back-end fails its self-test or its device: drop
/// just that producer, or abort the whole pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BistPolicy {
    #[default]
    Drop,
    Abort,
}

/// Consumer settings: the lookup store, the optional vanity pattern, and
/// the hit sink.
#[derive(Debug, Deserialize)]
pub struct ConsumerConfig {
    pub store_path: PathBuf,
    /// Lower bound on the store mapping, in bytes; a store file smaller
    /// than this is rejected at open.
    #[serde(default)]
    pub min_map_size: u64,
    #[serde(default)]
    pub vanity_pattern: Option<String>,
    pub hit_file: PathBuf,
    /// Hashing threads; defaults to the number of physical cores.
    #[serde(default)]
    pub threads: Option<usize>,
}

impl ConsumerConfig {
    pub fn effective_threads(&self) -> usize {
        self.threads
            .unwrap_or_else(num_cpus::get_physical)
            .max(1)
    }
}

/// Settings for `AddressFilesToLMDB`.
#[derive(Debug, Deserialize)]
pub struct ImportConfig {
    pub address_files: Vec<PathBuf>,
    pub store_path: PathBuf,
}

/// Settings for `LMDBToAddressFile`.
#[derive(Debug, Deserialize)]
pub struct ExportConfig {
    pub store_path: PathBuf,
    pub output_file: PathBuf,
    #[serde(default)]
    pub format: ExportFormat,
}

/// Fixed width writes the 40-hex-digit hash; variable width renders the
/// base-58 address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    #[default]
    FixedWidth,
    VariableWidth,
}
