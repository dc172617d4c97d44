//! `LMDBToAddressFile`: write the store back out as text.

use anyhow::Context;
use keyscout_engine::config::{ExportConfig, ExportFormat};
use keyscout_store::AddressStore;
use keyscout_types::address::render_p2pkh;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};

pub fn run(config: &ExportConfig) -> anyhow::Result<()> {
    let store = AddressStore::open(&config.store_path, 0).context("opening address store")?;
    let file = File::create(&config.output_file)
        .with_context(|| format!("creating {}", config.output_file.display()))?;
    let mut out = BufWriter::new(file);

    for (hash, amount) in store.iter() {
        match config.format {
            ExportFormat::FixedWidth => writeln!(out, "{}\t{}", hex::encode(hash), amount)?,
            ExportFormat::VariableWidth => {
                writeln!(out, "{}\t{}", render_p2pkh(&hash), amount)?
            }
        }
    }
    out.flush()?;

    info!(
        "exported {} entries to {}",
        store.size(),
        config.output_file.display()
    );
    Ok(())
}
