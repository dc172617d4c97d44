//! The hash & match stage: batches in, hits out.
//!
//! A pool of worker threads shares one bounded channel. Each batch is
//! hashed wholly by one worker; both serializations of every key are
//! probed against the store, and optionally rendered to base-58 for the
//! vanity pattern.

use crate::derive::Batch;
use crate::sink::{Hit, HitSink, KeyForm};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use keyscout_crypto::{compress, hash160};
use keyscout_store::AddressStore;
use keyscout_types::address::render_p2pkh;
use keyscout_types::constants::HASH160_SIZE;
use log::{debug, error};
use regex::Regex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Handle over the consumer worker pool.
pub struct ConsumerPool {
    handles: Vec<thread::JoinHandle<()>>,
    /// Scalars checked so far (each is probed in both forms).
    pub keys_checked: Arc<AtomicU64>,
}

impl ConsumerPool {
    /// Spawn `threads` workers draining `rx`. The stop flag is read at
    /// every queue operation; a raised flag ends a worker after it drains
    /// whatever is already queued, and a disconnected channel (every
    /// sender gone) ends it too.
    pub fn spawn(
        rx: Receiver<Batch>,
        store: Arc<AddressStore>,
        sink: Arc<HitSink>,
        vanity: Option<Regex>,
        threads: usize,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let keys_checked = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::with_capacity(threads);

        for worker_id in 0..threads {
            let rx = rx.clone();
            let store = Arc::clone(&store);
            let sink = Arc::clone(&sink);
            let vanity = vanity.clone();
            let stop = Arc::clone(&stop);
            let keys_checked = Arc::clone(&keys_checked);

            handles.push(thread::spawn(move || {
                debug!("consumer worker {} ready", worker_id);
                loop {
                    match rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(batch) => {
                            process_batch(&batch, &store, &sink, vanity.as_ref(), &stop);
                            keys_checked.fetch_add(batch.len() as u64, Ordering::Relaxed);
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    // A raised stop flag ends the worker, but only after
                    // in-flight batches have drained.
                    if stop.load(Ordering::Relaxed) {
                        while let Ok(batch) = rx.try_recv() {
                            process_batch(&batch, &store, &sink, vanity.as_ref(), &stop);
                            keys_checked.fetch_add(batch.len() as u64, Ordering::Relaxed);
                        }
                        break;
                    }
                }
                debug!("consumer worker {} done", worker_id);
            }));
        }

        Self {
            handles,
            keys_checked,
        }
    }

    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn process_batch(
    batch: &Batch,
    store: &AddressStore,
    sink: &HitSink,
    vanity: Option<&Regex>,
    stop: &AtomicBool,
) {
    for i in 0..batch.len() {
        let uncompressed = batch.point_at(i);
        let compressed = compress(uncompressed);

        probe(batch, i, KeyForm::Uncompressed, uncompressed, store, sink, vanity, stop);
        probe(batch, i, KeyForm::Compressed, &compressed, store, sink, vanity, stop);
    }
}

#[allow(clippy::too_many_arguments)]
fn probe(
    batch: &Batch,
    index: usize,
    form: KeyForm,
    serialized: &[u8],
    store: &AddressStore,
    sink: &HitSink,
    vanity: Option<&Regex>,
    stop: &AtomicBool,
) {
    let hash: [u8; HASH160_SIZE] = hash160(serialized);
    let amount = store.contains(&hash);

    let mut address = None;
    let vanity_match = match vanity {
        Some(pattern) => {
            let rendered = render_p2pkh(&hash);
            let matched = pattern.is_match(&rendered);
            address = Some(rendered);
            matched
        }
        None => false,
    };

    if amount.is_none() && !vanity_match {
        return;
    }

    let hit = Hit {
        scalar: batch.scalar_at(index),
        form,
        hash,
        amount: amount.unwrap_or(0),
        address: address.unwrap_or_else(|| render_p2pkh(&hash)),
    };
    if let Err(e) = sink.record(&hit) {
        // A sink that cannot take hits makes the whole run pointless.
        error!("hit sink write failed, stopping pipeline: {}", e);
        stop.store(true, Ordering::SeqCst);
    }
}
