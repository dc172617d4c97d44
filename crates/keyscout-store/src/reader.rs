//! Read side: open, map, binary-search.

use crate::format::{decode_amount, HEADER_SIZE, MAGIC, RECORD_SIZE};
use crate::StoreError;
use keyscout_types::constants::HASH160_SIZE;
use log::{debug, info};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// A read-only, memory-mapped address store. Cheap to share behind an
/// `Arc`; `contains` takes `&self` and performs no locking.
pub struct AddressStore {
    mmap: Mmap,
    count: u64,
}

impl AddressStore {
    /// Open and map a store file. `min_map_size` is the configured lower
    /// bound on the mapping: a file smaller than it is rejected at open,
    /// so a run never starts against a store that is truncated relative
    /// to its configuration.
    pub fn open(path: &Path, min_map_size: u64) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let floor = min_map_size.max(HEADER_SIZE as u64);
        if file_len < floor {
            return Err(StoreError::MapTooSmall {
                expected: floor,
                actual: file_len,
            });
        }

        // Safety: the file is opened read-only and the pipeline never
        // mutates a store while producers are running.
        let mmap = unsafe { Mmap::map(&file)? };

        if &mmap[..MAGIC.len()] != MAGIC {
            return Err(StoreError::BadMagic);
        }
        let count = u64::from_le_bytes(mmap[MAGIC.len()..HEADER_SIZE].try_into().unwrap());

        let data_size = HEADER_SIZE as u64 + count * RECORD_SIZE as u64;
        if data_size > file_len {
            return Err(StoreError::MapTooSmall {
                expected: data_size,
                actual: file_len,
            });
        }
        info!(
            "opened store {} ({} entries, {} bytes mapped)",
            path.display(),
            count,
            file_len
        );

        Ok(Self { mmap, count })
    }

    /// Number of entries.
    pub fn size(&self) -> u64 {
        self.count
    }

    /// Point lookup. Returns the logical amount (sentinel translated) when
    /// the hash is present.
    #[inline]
    pub fn contains(&self, hash: &[u8; HASH160_SIZE]) -> Option<u64> {
        let mut lo = 0usize;
        let mut hi = self.count as usize;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let key = self.key_at(mid);
            match key.cmp(hash.as_slice()) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => {
                    return Some(decode_amount(self.amount_at(mid)));
                }
            }
        }
        None
    }

    /// Iterate all entries in key order with logical amounts. Used by the
    /// exporter; not a hot path.
    pub fn iter(&self) -> impl Iterator<Item = ([u8; HASH160_SIZE], u64)> + '_ {
        (0..self.count as usize).map(|i| {
            let mut key = [0u8; HASH160_SIZE];
            key.copy_from_slice(self.key_at(i));
            (key, decode_amount(self.amount_at(i)))
        })
    }

    /// Drop the mapping. Equivalent to dropping the value; exists so the
    /// coordinator can unmap at a well-defined point during shutdown.
    pub fn close(self) {
        debug!("closing store ({} entries)", self.count);
    }

    #[inline]
    fn key_at(&self, index: usize) -> &[u8] {
        let off = HEADER_SIZE + index * RECORD_SIZE;
        &self.mmap[off..off + HASH160_SIZE]
    }

    #[inline]
    fn amount_at(&self, index: usize) -> u64 {
        let off = HEADER_SIZE + index * RECORD_SIZE + HASH160_SIZE;
        u64::from_le_bytes(self.mmap[off..off + 8].try_into().unwrap())
    }
}
