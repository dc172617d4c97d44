//! Producers: one thread each, deriving batches and pushing them into the
//! bounded queue until stopped, out of input, or done (run-once).

use crate::derive::{Batch, CpuBackend, DerivationBackend, DeriveError};
use crate::key_source::KeySource;
use crossbeam_channel::Sender;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

/// Lifecycle of a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProducerState {
    Uninitialized = 0,
    Initialized = 1,
    Running = 2,
    NotRunning = 3,
}

/// Shared, lock-free view of a producer's state.
pub struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(ProducerState::Uninitialized as u8))
    }

    fn set(&self, state: ProducerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> ProducerState {
        match self.0.load(Ordering::SeqCst) {
            0 => ProducerState::Uninitialized,
            1 => ProducerState::Initialized,
            2 => ProducerState::Running,
            _ => ProducerState::NotRunning,
        }
    }
}

/// Deferred back-end construction. GPU back-ends do their device setup and
/// self-test on the producer's own thread, so the factory runs there.
pub type BackendFactory =
    Box<dyn FnOnce() -> Result<Box<dyn DerivationBackend>, DeriveError> + Send>;

/// What a producer does per iteration.
pub enum ProducerWork {
    /// Grid derivation: one base from the source, 2^bits keys per batch.
    Grid { factory: BackendFactory, bits: u32 },
    /// Single-key derivation: chunk_size scalars from the source per batch.
    Each { chunk_size: usize },
}

/// A running producer thread plus its observable state.
pub struct Producer {
    name: String,
    state: Arc<StateCell>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Producer {
    /// Spawn a producer. `abort_on_failure` escalates an initialization or
    /// device failure to a whole-pipeline stop instead of dropping just
    /// this producer.
    pub fn spawn(
        name: String,
        source: Arc<dyn KeySource>,
        work: ProducerWork,
        run_once: bool,
        abort_on_failure: bool,
        tx: Sender<Batch>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let state = Arc::new(StateCell::new());
        let thread_state = Arc::clone(&state);
        let thread_name = name.clone();

        let handle = thread::spawn(move || {
            run_producer(
                &thread_name,
                source,
                work,
                run_once,
                abort_on_failure,
                tx,
                stop,
                &thread_state,
            );
        });

        Self {
            name,
            state,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProducerState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.state.get() == ProducerState::NotRunning
    }

    /// Join the thread if it has already reached NOT_RUNNING; otherwise the
    /// handle is left to the caller's deadline logic.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_producer(
    name: &str,
    source: Arc<dyn KeySource>,
    work: ProducerWork,
    run_once: bool,
    abort_on_failure: bool,
    tx: Sender<Batch>,
    stop: Arc<AtomicBool>,
    state: &StateCell,
) {
    match work {
        ProducerWork::Grid { factory, bits } => {
            let mut backend = match factory() {
                Ok(backend) => backend,
                Err(e) => {
                    error!("producer {}: back-end init failed: {}", name, e);
                    if abort_on_failure {
                        stop.store(true, Ordering::SeqCst);
                    }
                    state.set(ProducerState::NotRunning);
                    return;
                }
            };
            state.set(ProducerState::Initialized);
            info!("producer {} ready ({}, {} grid bits)", name, backend.name(), bits);

            state.set(ProducerState::Running);
            grid_loop(
                name,
                source.as_ref(),
                backend.as_mut(),
                bits,
                run_once,
                abort_on_failure,
                &tx,
                &stop,
            );
        }
        ProducerWork::Each { chunk_size } => {
            let backend = CpuBackend::new();
            state.set(ProducerState::Initialized);
            info!("producer {} ready (single-key, chunks of {})", name, chunk_size);

            state.set(ProducerState::Running);
            each_loop(name, source.as_ref(), &backend, chunk_size, run_once, &tx, &stop);
        }
    }
    state.set(ProducerState::NotRunning);
    info!("producer {} stopped", name);
}

#[allow(clippy::too_many_arguments)]
fn grid_loop(
    name: &str,
    source: &dyn KeySource,
    backend: &mut dyn DerivationBackend,
    bits: u32,
    run_once: bool,
    abort_on_failure: bool,
    tx: &Sender<Batch>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Relaxed) {
        let base = match source.next_base() {
            Some(base) => base,
            None => {
                info!("producer {}: key source exhausted", name);
                break;
            }
        };
        match backend.derive_batch(base, bits) {
            Ok(batch) => {
                // A stop raised while the derivation ran drops the batch;
                // there is no mid-batch cancellation.
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                // Blocking push is the back-pressure edge; a send error
                // means the consumer side is gone.
                if tx.send(batch).is_err() {
                    break;
                }
            }
            Err(e @ DeriveError::Device(_)) => {
                error!("producer {}: {}", name, e);
                if abort_on_failure {
                    stop.store(true, Ordering::SeqCst);
                }
                break;
            }
            Err(e) => {
                // Never retried; the batch is dropped and the next base
                // is attempted.
                warn!("producer {}: batch dropped: {}", name, e);
            }
        }
        if run_once {
            break;
        }
    }
}

fn each_loop(
    name: &str,
    source: &dyn KeySource,
    backend: &CpuBackend,
    chunk_size: usize,
    run_once: bool,
    tx: &Sender<Batch>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Relaxed) {
        let scalars = source.next_batch(chunk_size);
        if scalars.is_empty() {
            info!("producer {}: key source exhausted", name);
            break;
        }
        let batch = backend.derive_each(scalars);
        if tx.send(batch).is_err() {
            break;
        }
        if run_once {
            break;
        }
    }
}
