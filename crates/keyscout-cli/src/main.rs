use clap::Parser;
use keyscout_engine::config::{Command, Document};
use log::info;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod export;
mod import;
mod info;

/// keyscout: explore the secp256k1 key space against a store of known
/// address hashes.
#[derive(Parser)]
#[command(name = "keyscout")]
#[command(about = "secp256k1 key-space search against a known-address store")]
#[command(version)]
struct Cli {
    /// Path to the JSON configuration document.
    config: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let document = match Document::from_path(&cli.config) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match document.command {
        Command::Find => run_find(&document),
        Command::AddressFilesToLMDB => import::run(
            document
                .import
                .as_ref()
                .expect("validated: import section present"),
        ),
        Command::LMDBToAddressFile => export::run(
            document
                .export
                .as_ref()
                .expect("validated: export section present"),
        ),
        Command::OpenCLInfo => info::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_find(document: &Document) -> anyhow::Result<()> {
    let find = document
        .find
        .as_ref()
        .expect("validated: find section present");

    // The shared stop flag; raised by the signal handler and read by every
    // producer at batch boundaries. Raising it twice is harmless.
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        info!("interrupt received, shutting down");
        handler_stop.store(true, Ordering::SeqCst);
    })?;

    let summary = keyscout_engine::run_find(find, stop)?;
    info!(
        "done: {} keys checked, {} hits{}",
        summary.keys_checked,
        summary.hits,
        if summary.forced_termination {
            " (forced termination)"
        } else {
            ""
        }
    );
    Ok(())
}
