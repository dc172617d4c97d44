//! Pipeline assembly and lifecycle supervision.
//!
//! Startup order is fixed: store and key sources first, then the consumer
//! pool, then the producers. The coordinator owns every component;
//! producers and consumers only ever hold queue handles and the shared
//! read-only store. Shutdown flows from one shared stop flag.

use crate::config::{BistPolicy, ConfigError, FindConfig, ProducerKind};
use crate::consumer::ConsumerPool;
use crate::derive::{CpuBackend, DerivationBackend};
use crate::key_source::{self, KeySource, KeySourceError};
use crate::producer::{BackendFactory, Producer, ProducerWork};
use crate::sink::HitSink;
use keyscout_store::{AddressStore, StoreError};
use log::{info, warn};
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Queue capacity per consumer thread. Keeps hashers fed without letting a
/// fast producer pile unbounded batches onto the host.
const QUEUE_FACTOR: usize = 4;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot open address store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    KeySource(#[from] KeySourceError),

    #[error("cannot open hit sink: {0}")]
    Sink(std::io::Error),
}

/// End-of-run accounting.
#[derive(Debug)]
pub struct FindSummary {
    pub keys_checked: u64,
    pub hits: u64,
    pub elapsed: Duration,
    /// True when the shutdown deadline expired with producers still alive.
    pub forced_termination: bool,
}

/// Run the full Find pipeline until every producer finishes or `stop` is
/// raised (typically from the signal handler). Safe to interrupt more than
/// once; extra raises are no-ops.
pub fn run_find(config: &FindConfig, stop: Arc<AtomicBool>) -> Result<FindSummary, PipelineError> {
    config.validate()?;

    let started = Instant::now();

    // Leaves first: the lookup oracle and the scalar sources.
    let store = Arc::new(AddressStore::open(
        &config.consumer.store_path,
        config.consumer.min_map_size,
    )?);

    let mut sources: HashMap<String, Arc<dyn KeySource>> = HashMap::new();
    for source_config in &config.key_sources {
        sources.insert(source_config.id.clone(), key_source::build(source_config)?);
    }

    // Then the consumer side.
    let sink = Arc::new(HitSink::open(&config.consumer.hit_file).map_err(PipelineError::Sink)?);
    let vanity = match &config.consumer.vanity_pattern {
        Some(pattern) => Some(Regex::new(pattern).map_err(ConfigError::from)?),
        None => None,
    };
    let threads = config.consumer.effective_threads();
    let (tx, rx) = crossbeam_channel::bounded(threads * QUEUE_FACTOR);
    let consumers = ConsumerPool::spawn(
        rx,
        Arc::clone(&store),
        Arc::clone(&sink),
        vanity,
        threads,
        Arc::clone(&stop),
    );
    info!(
        "consumer pool up: {} threads, queue capacity {}",
        threads,
        threads * QUEUE_FACTOR
    );

    // Producers last.
    let mut producers = Vec::with_capacity(config.producers.len());
    for (index, producer_config) in config.producers.iter().enumerate() {
        let source = Arc::clone(
            sources
                .get(&producer_config.key_source)
                .expect("validated: every producer references a known key source"),
        );
        let (name, work, abort_on_failure) = match &producer_config.kind {
            ProducerKind::Cpu { grid_bits } => {
                let bits = *grid_bits;
                let factory: BackendFactory =
                    Box::new(|| Ok(Box::new(CpuBackend::new()) as Box<dyn DerivationBackend>));
                (format!("cpu-{}", index), ProducerWork::Grid { factory, bits }, false)
            }
            ProducerKind::FileReplay { chunk_size } => (
                format!("file-{}", index),
                ProducerWork::Each {
                    chunk_size: *chunk_size,
                },
                false,
            ),
            ProducerKind::Gpu {
                device,
                grid_bits,
                on_bist_failure,
            } => {
                let factory = gpu_factory(*device, *grid_bits);
                (
                    format!("gpu-{}", index),
                    ProducerWork::Grid {
                        factory,
                        bits: *grid_bits,
                    },
                    *on_bist_failure == BistPolicy::Abort,
                )
            }
        };
        producers.push(Producer::spawn(
            name,
            source,
            work,
            producer_config.run_once,
            abort_on_failure,
            tx.clone(),
            Arc::clone(&stop),
        ));
    }
    // The producers hold the only senders now; consumers finish when the
    // channel disconnects or the stop flag is raised, after draining.
    drop(tx);

    supervise(&producers, &consumers, &stop);

    // Shutdown: raise the flag (idempotent), then wait for the pool up to
    // the configured deadline.
    stop.store(true, Ordering::SeqCst);
    let deadline = Instant::now() + Duration::from_secs(config.shutdown_deadline_secs);
    let mut forced_termination = false;
    for producer in &mut producers {
        while !producer.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        if producer.is_finished() {
            producer.join();
        } else {
            warn!(
                "producer {} still running past the shutdown deadline, detaching",
                producer.name()
            );
            forced_termination = true;
        }
    }

    // Workers read the stop flag at every queue operation, so the pool is
    // joinable even when a detached producer still holds a sender.
    let keys_checked = Arc::clone(&consumers.keys_checked);
    consumers.join();

    let summary = FindSummary {
        keys_checked: keys_checked.load(Ordering::Relaxed),
        hits: sink.hits(),
        elapsed: started.elapsed(),
        forced_termination,
    };
    info!(
        "find finished: {} keys in {:.1}s ({} hits)",
        summary.keys_checked,
        summary.elapsed.as_secs_f64(),
        summary.hits
    );

    drop(producers);
    if let Ok(store) = Arc::try_unwrap(store) {
        store.close();
    }
    Ok(summary)
}

/// Watch the pipeline until interrupted or until every producer finishes,
/// logging throughput along the way.
fn supervise(producers: &[Producer], consumers: &ConsumerPool, stop: &AtomicBool) {
    let started = Instant::now();
    let mut last_stats = Instant::now();
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if producers.iter().all(Producer::is_finished) {
            info!("all producers finished");
            break;
        }
        std::thread::sleep(Duration::from_millis(200));

        if last_stats.elapsed() > Duration::from_secs(10) {
            let keys = consumers.keys_checked.load(Ordering::Relaxed);
            let rate = keys as f64 / started.elapsed().as_secs_f64();
            info!("checked {} keys ({:.0} keys/s)", keys, rate);
            last_stats = Instant::now();
        }
    }
}

#[cfg(feature = "opencl")]
fn gpu_factory(device: usize, grid_bits: u32) -> BackendFactory {
    Box::new(move || {
        let mut gpu = crate::gpu::GpuBackend::new(device, grid_bits)?;
        let mut reference = CpuBackend::new();
        crate::derive::self_test(&mut gpu, &mut reference)?;
        Ok(Box::new(gpu) as Box<dyn DerivationBackend>)
    })
}

#[cfg(not(feature = "opencl"))]
fn gpu_factory(_device: usize, _grid_bits: u32) -> BackendFactory {
    Box::new(|| {
        Err(crate::derive::DeriveError::Device(
            "this build has no OpenCL support (enable the `opencl` feature)".to_string(),
        ))
    })
}
