//! `AddressFilesToLMDB`: parse plaintext address dumps and build the store.
//!
//! Lines are decoded in parallel chunks; per-line failures are counted and
//! skipped, while a store write failure aborts the whole import.

use anyhow::Context;
use keyscout_engine::config::ImportConfig;
use keyscout_store::StoreWriter;
use keyscout_types::address::{parse_dump_line, ParsedLine};
use log::{info, warn};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Lines decoded per parallel burst.
const CHUNK_SIZE: usize = 65_536;

/// How many offending lines to keep verbatim for the report.
const KEPT_FAILURES: usize = 10;

#[derive(Debug, Default)]
pub struct ImportStats {
    pub total_lines: u64,
    pub imported: u64,
    pub ignored: u64,
    pub unsupported: u64,
    pub unchecked: u64,
    pub failed: u64,
    pub failed_samples: Vec<String>,
}

pub fn run(config: &ImportConfig) -> anyhow::Result<()> {
    let mut writer = StoreWriter::new();
    let mut stats = ImportStats::default();

    for path in &config.address_files {
        import_file(path, &mut writer, &mut stats)
            .with_context(|| format!("importing {}", path.display()))?;
    }

    let written = writer
        .finish(&config.store_path)
        .context("writing address store")?;

    info!(
        "import complete: {} lines, {} imported ({} via unchecked decode), {} ignored, {} unsupported, {} failed; {} unique entries written",
        stats.total_lines,
        stats.imported,
        stats.unchecked,
        stats.ignored,
        stats.unsupported,
        stats.failed,
        written
    );
    for line in &stats.failed_samples {
        warn!("unparseable line: {}", line);
    }
    Ok(())
}

fn import_file(
    path: &Path,
    writer: &mut StoreWriter,
    stats: &mut ImportStats,
) -> anyhow::Result<()> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();
    let mut chunk = Vec::with_capacity(CHUNK_SIZE);

    info!("importing {}", path.display());
    loop {
        chunk.clear();
        for line in lines.by_ref().take(CHUNK_SIZE) {
            chunk.push(line?);
        }
        if chunk.is_empty() {
            break;
        }

        let parsed: Vec<_> = chunk
            .par_iter()
            .map(|line| parse_dump_line(line))
            .collect();

        stats.total_lines += chunk.len() as u64;
        for (result, line) in parsed.into_iter().zip(&chunk) {
            match result {
                Ok(ParsedLine::Entry { address, amount }) => {
                    writer.add(address.hash, amount);
                    stats.imported += 1;
                    if address.unchecked {
                        stats.unchecked += 1;
                    }
                }
                Ok(ParsedLine::Ignored) => stats.ignored += 1,
                Ok(ParsedLine::Unsupported) => stats.unsupported += 1,
                Err(_) => {
                    stats.failed += 1;
                    if stats.failed_samples.len() < KEPT_FAILURES {
                        stats.failed_samples.push(line.clone());
                    }
                }
            }
        }
    }
    Ok(())
}
