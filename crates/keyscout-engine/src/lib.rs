//! The keyscout search pipeline: key sources, batch derivation (CPU and
//! OpenCL), the hash/match consumer pool, and the coordinator that wires
//! them together behind a bounded queue.

pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod derive;
#[cfg(feature = "opencl")]
pub mod gpu;
pub mod key_source;
pub mod producer;
pub mod sink;

pub use config::{Command, Document, FindConfig};
pub use coordinator::{run_find, FindSummary};
pub use derive::{Batch, CpuBackend, DerivationBackend, DeriveError, MAX_GRID_BITS};
pub use sink::{Hit, HitSink, KeyForm};
