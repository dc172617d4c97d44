//! On-disk layout constants.
//!
//! ```text
//! offset 0   8-byte magic
//! offset 8   record count, u64 little-endian
//! offset 16  count × 28-byte records: 20-byte key | 8-byte LE amount
//! ```
//!
//! Records are sorted by unsigned lexicographic key order and unique.

use keyscout_types::constants::{AMOUNT_SIZE, HASH160_SIZE};

pub const MAGIC: &[u8; 8] = b"KSCOUT01";

pub const HEADER_SIZE: usize = MAGIC.len() + 8;

pub const RECORD_SIZE: usize = HASH160_SIZE + AMOUNT_SIZE;

/// Stored amount standing in for logical zero.
pub const ZERO_SENTINEL: u64 = 1;

/// Sentinel applied on the write path.
#[inline]
pub fn encode_amount(logical: u64) -> u64 {
    if logical == 0 {
        ZERO_SENTINEL
    } else {
        logical
    }
}

/// Sentinel removed on the read path.
#[inline]
pub fn decode_amount(stored: u64) -> u64 {
    if stored == ZERO_SENTINEL {
        0
    } else {
        stored
    }
}
