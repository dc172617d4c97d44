//! The hit sink: where found keys land.
//!
//! Appends are serialized behind a mutex; hits are rare enough that the
//! lock never sits on the hot path.

use keyscout_types::constants::HASH160_SIZE;
use keyscout_types::Scalar;
use log::info;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Which serialization matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyForm {
    Uncompressed,
    Compressed,
}

impl KeyForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyForm::Uncompressed => "uncompressed",
            KeyForm::Compressed => "compressed",
        }
    }
}

/// A found key: the scalar, the matched hash, the serialization form, the
/// stored amount (sentinel already translated), and the base-58 rendering.
#[derive(Debug, Clone)]
pub struct Hit {
    pub scalar: Scalar,
    pub form: KeyForm,
    pub hash: [u8; HASH160_SIZE],
    pub amount: u64,
    pub address: String,
}

/// Append-only hit file, shared by every consumer thread.
pub struct HitSink {
    file: Mutex<File>,
    path: PathBuf,
    hits: AtomicU64,
}

impl HitSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            hits: AtomicU64::new(0),
        })
    }

    /// Append one hit record: `scalar_hex\tform\thash_hex\tamount\tbase58`.
    pub fn record(&self, hit: &Hit) -> std::io::Result<()> {
        info!(
            "HIT {} {} amount={} address={}",
            hit.scalar,
            hit.form.as_str(),
            hit.amount,
            hit.address
        );
        let mut file = self.file.lock().unwrap();
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}",
            hit.scalar.to_hex(),
            hit.form.as_str(),
            hex::encode(hit.hash),
            hit.amount,
            hit.address
        )?;
        file.flush()?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hits.txt");
        let sink = HitSink::open(&path).unwrap();

        let hit = Hit {
            scalar: Scalar::from_u64(1),
            form: KeyForm::Compressed,
            hash: {
                let mut h = [0u8; HASH160_SIZE];
                h[0] = 0xAB;
                h
            },
            amount: 0,
            address: "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH".to_string(),
        };
        sink.record(&hit).unwrap();
        sink.record(&hit).unwrap();
        assert_eq!(sink.hits(), 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let fields: Vec<_> = lines[0].split('\t').collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(
            fields[0],
            "0000000000000000000000000000000000000000000000000000000000000001"
        );
        assert_eq!(fields[1], "compressed");
        assert!(fields[2].starts_with("ab000000"));
        assert_eq!(fields[3], "0");
        assert_eq!(fields[4], "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    }

    #[test]
    fn test_append_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hits.txt");

        let hit = Hit {
            scalar: Scalar::from_u64(2),
            form: KeyForm::Uncompressed,
            hash: [0u8; HASH160_SIZE],
            amount: 7,
            address: String::new(),
        };
        HitSink::open(&path).unwrap().record(&hit).unwrap();
        HitSink::open(&path).unwrap().record(&hit).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
