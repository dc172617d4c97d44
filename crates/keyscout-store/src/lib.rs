//! The keyscout lookup oracle: a read-only, memory-mapped, sorted map from
//! 20-byte hash-160 keys to 8-byte amounts.
//!
//! The on-disk layout is a small header followed by fixed-width records
//! sorted by key bytes, so point lookups are a binary search over the
//! mapping: O(log N), lock-free, and safe from any number of reader threads.
//! Amounts use a sentinel: a stored value of `1` denotes logical zero, so
//! that zero-amount keys survive engines that reject empty values. The
//! wrapper round-trips the sentinel in both directions.

mod format;
mod reader;
mod writer;

pub use format::{HEADER_SIZE, MAGIC, RECORD_SIZE};
pub use reader::AddressStore;
pub use writer::StoreWriter;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a keyscout store (bad magic)")]
    BadMagic,

    #[error("store requires a map of {expected} bytes but the file has {actual}")]
    MapTooSmall { expected: u64, actual: u64 },
}
