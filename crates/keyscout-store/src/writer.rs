//! Write side: collect, sort, write atomically.

use crate::format::{encode_amount, MAGIC, RECORD_SIZE};
use crate::StoreError;
use keyscout_types::constants::HASH160_SIZE;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Builds a store file from (hash, logical amount) pairs. Entries are
/// buffered in memory, sorted and deduplicated at `finish`, and written
/// through a temp file so a crashed import never leaves a half-written
/// store behind.
pub struct StoreWriter {
    entries: Vec<([u8; HASH160_SIZE], u64)>,
}

impl StoreWriter {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Queue one entry. Amounts are logical; the zero sentinel is applied
    /// when the file is written.
    pub fn add(&mut self, hash: [u8; HASH160_SIZE], amount: u64) {
        self.entries.push((hash, amount));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort, deduplicate (highest amount wins), and write the store file.
    /// Returns the number of unique records written.
    pub fn finish(mut self, path: &Path) -> Result<u64, StoreError> {
        self.entries.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        // After the secondary sort on amount, the last of each key run
        // carries the highest amount.
        let mut unique: Vec<([u8; HASH160_SIZE], u64)> = Vec::with_capacity(self.entries.len());
        for (hash, amount) in self.entries {
            match unique.last_mut() {
                Some((last, value)) if *last == hash => *value = amount,
                _ => unique.push((hash, amount)),
            }
        }

        let tmp = path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut out = BufWriter::new(file);
            out.write_all(MAGIC)?;
            out.write_all(&(unique.len() as u64).to_le_bytes())?;
            let mut record = [0u8; RECORD_SIZE];
            for (hash, amount) in &unique {
                record[..HASH160_SIZE].copy_from_slice(hash);
                record[HASH160_SIZE..].copy_from_slice(&encode_amount(*amount).to_le_bytes());
                out.write_all(&record)?;
            }
            out.flush()?;
        }
        std::fs::rename(&tmp, path)?;

        info!("wrote store {} ({} entries)", path.display(), unique.len());
        Ok(unique.len() as u64)
    }
}

impl Default for StoreWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::HEADER_SIZE;
    use crate::AddressStore;

    fn hash(n: u8) -> [u8; HASH160_SIZE] {
        let mut h = [0u8; HASH160_SIZE];
        h[0] = n;
        h[19] = n;
        h
    }

    #[test]
    fn test_roundtrip_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ksc");

        let mut writer = StoreWriter::new();
        writer.add(hash(3), 300);
        writer.add(hash(1), 100);
        writer.add(hash(2), 200);
        assert_eq!(writer.finish(&path).unwrap(), 3);

        let store = AddressStore::open(&path, 0).unwrap();
        assert_eq!(store.size(), 3);
        assert_eq!(store.contains(&hash(1)), Some(100));
        assert_eq!(store.contains(&hash(2)), Some(200));
        assert_eq!(store.contains(&hash(3)), Some(300));
        assert_eq!(store.contains(&hash(4)), None);
        assert_eq!(store.contains(&[0xFF; HASH160_SIZE]), None);
    }

    #[test]
    fn test_sentinel_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ksc");

        let mut writer = StoreWriter::new();
        writer.add([0u8; HASH160_SIZE], 0);
        writer.finish(&path).unwrap();

        // The raw stored amount is the sentinel 1…
        let raw = std::fs::read(&path).unwrap();
        let amount_off = HEADER_SIZE + HASH160_SIZE;
        assert_eq!(&raw[amount_off..amount_off + 8], &1u64.to_le_bytes());

        // …but the wrapper reports logical zero.
        let store = AddressStore::open(&path, 0).unwrap();
        assert_eq!(store.contains(&[0u8; HASH160_SIZE]), Some(0));
    }

    #[test]
    fn test_duplicate_keys_highest_amount_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ksc");

        let mut writer = StoreWriter::new();
        writer.add(hash(7), 5);
        writer.add(hash(7), 50);
        writer.add(hash(7), 20);
        assert_eq!(writer.finish(&path).unwrap(), 1);

        let store = AddressStore::open(&path, 0).unwrap();
        assert_eq!(store.contains(&hash(7)), Some(50));
    }

    #[test]
    fn test_iter_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ksc");

        let mut writer = StoreWriter::new();
        for n in [9u8, 4, 6, 1] {
            writer.add(hash(n), n as u64);
        }
        writer.finish(&path).unwrap();

        let store = AddressStore::open(&path, 0).unwrap();
        let keys: Vec<_> = store.iter().map(|(k, _)| k).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("nope.ksc");
        assert!(matches!(
            AddressStore::open(&missing, 0),
            Err(crate::StoreError::Io(_))
        ));

        let garbage = dir.path().join("garbage.ksc");
        std::fs::write(&garbage, b"XXXXXXXXXXXXXXXXXXXXXXXX").unwrap();
        assert!(matches!(
            AddressStore::open(&garbage, 0),
            Err(crate::StoreError::BadMagic)
        ));
    }

    #[test]
    fn test_open_rejects_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ksc");

        let mut writer = StoreWriter::new();
        for n in 0..10u8 {
            writer.add(hash(n), 1);
        }
        writer.finish(&path).unwrap();

        // Chop a record off the tail; the header's claimed data size now
        // exceeds the mapped size.
        let raw = std::fs::read(&path).unwrap();
        std::fs::write(&path, &raw[..raw.len() - RECORD_SIZE]).unwrap();
        assert!(matches!(
            AddressStore::open(&path, 0),
            Err(crate::StoreError::MapTooSmall { .. })
        ));
    }

    #[test]
    fn test_open_enforces_min_map_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ksc");

        let mut writer = StoreWriter::new();
        writer.add(hash(1), 1);
        writer.finish(&path).unwrap();
        let file_len = std::fs::metadata(&path).unwrap().len();

        // A configured minimum above the file size rejects the store…
        assert!(matches!(
            AddressStore::open(&path, file_len + 1),
            Err(crate::StoreError::MapTooSmall { .. })
        ));
        // …while a minimum at or below it opens normally.
        assert!(AddressStore::open(&path, file_len).is_ok());
        assert!(AddressStore::open(&path, 0).is_ok());
    }

    #[test]
    fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ksc");
        StoreWriter::new().finish(&path).unwrap();

        let store = AddressStore::open(&path, 0).unwrap();
        assert_eq!(store.size(), 0);
        assert_eq!(store.contains(&hash(1)), None);
    }
}
