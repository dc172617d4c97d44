//! End-to-end pipeline scenarios: a real store, real config documents, and
//! the full coordinator lifecycle.

use keyscout_engine::config::FindConfig;
use keyscout_engine::coordinator::PipelineError;
use keyscout_engine::key_source::KeySource;
use keyscout_engine::producer::{BackendFactory, Producer, ProducerState, ProducerWork};
use keyscout_engine::{run_find, Batch, CpuBackend, DerivationBackend};
use keyscout_store::StoreWriter;
use keyscout_types::constants::HASH160_SIZE;
use keyscout_types::Scalar;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn write_store(path: &Path, entries: &[([u8; HASH160_SIZE], u64)]) {
    let mut writer = StoreWriter::new();
    for (hash, amount) in entries {
        writer.add(*hash, *amount);
    }
    writer.finish(path).unwrap();
}

fn key_one_compressed_hash() -> [u8; HASH160_SIZE] {
    hex::decode("751e76e8199196d454941c45d1b3a323f1433bd6")
        .unwrap()
        .try_into()
        .unwrap()
}

fn find_config(json: &str) -> FindConfig {
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_known_key_store_hit() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.ksc");
    let hit_path = dir.path().join("hits.txt");
    let keys_path = dir.path().join("keys.txt");

    // The store knows the compressed key-1 hash with a logical-zero amount.
    write_store(&store_path, &[(key_one_compressed_hash(), 0)]);
    std::fs::write(&keys_path, "1\n").unwrap();

    let config = find_config(&format!(
        r#"{{
            "key_sources": [
                {{"id": "replay", "type": "file-replay", "path": {keys:?}, "format": "hex"}}
            ],
            "producers": [
                {{"key_source": "replay", "type": "file-replay", "chunk_size": 16}}
            ],
            "consumer": {{
                "store_path": {store:?},
                "hit_file": {hits:?},
                "threads": 2
            }},
            "shutdown_deadline_secs": 5
        }}"#,
        keys = keys_path,
        store = store_path,
        hits = hit_path
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let summary = run_find(&config, stop).unwrap();

    assert_eq!(summary.keys_checked, 1);
    assert_eq!(summary.hits, 1);
    assert!(!summary.forced_termination);

    let contents = std::fs::read_to_string(&hit_path).unwrap();
    let fields: Vec<_> = contents.trim_end().split('\t').collect();
    assert_eq!(fields.len(), 5);
    assert!(fields[0].ends_with("0001"));
    assert_eq!(fields[1], "compressed");
    assert_eq!(fields[2], "751e76e8199196d454941c45d1b3a323f1433bd6");
    assert_eq!(fields[3], "0");
    assert_eq!(fields[4], "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
}

#[test]
fn test_vanity_hit_against_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.ksc");
    let hit_path = dir.path().join("hits.txt");
    let keys_path = dir.path().join("keys.txt");

    write_store(&store_path, &[]);
    std::fs::write(&keys_path, "1\n").unwrap();

    let config = find_config(&format!(
        r#"{{
            "key_sources": [
                {{"id": "replay", "type": "file-replay", "path": {keys:?}, "format": "decimal"}}
            ],
            "producers": [
                {{"key_source": "replay", "type": "file-replay", "chunk_size": 4}}
            ],
            "consumer": {{
                "store_path": {store:?},
                "hit_file": {hits:?},
                "vanity_pattern": "^1BgGZ9tcN4rm",
                "threads": 1
            }}
        }}"#,
        keys = keys_path,
        store = store_path,
        hits = hit_path
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let summary = run_find(&config, stop).unwrap();
    assert_eq!(summary.hits, 1);

    let contents = std::fs::read_to_string(&hit_path).unwrap();
    assert!(contents.contains("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"));
}

#[test]
fn test_run_once_cpu_grid_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.ksc");
    let hit_path = dir.path().join("hits.txt");
    write_store(&store_path, &[]);

    let config = find_config(&format!(
        r#"{{
            "key_sources": [
                {{"id": "rng", "type": "seeded-random", "seed": 1234}}
            ],
            "producers": [
                {{"key_source": "rng", "type": "cpu", "grid_bits": 6, "run_once": true}},
                {{"key_source": "rng", "type": "cpu", "grid_bits": 6, "run_once": true}}
            ],
            "consumer": {{
                "store_path": {store:?},
                "hit_file": {hits:?},
                "threads": 2
            }}
        }}"#,
        store = store_path,
        hits = hit_path
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let summary = run_find(&config, stop).unwrap();
    // Two producers, one 2^6 batch each.
    assert_eq!(summary.keys_checked, 128);
    assert_eq!(summary.hits, 0);
    assert!(!summary.forced_termination);
}

#[test]
fn test_interrupt_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.ksc");
    let hit_path = dir.path().join("hits.txt");
    write_store(&store_path, &[]);

    let config = find_config(&format!(
        r#"{{
            "key_sources": [
                {{"id": "rng", "type": "secure-random"}}
            ],
            "producers": [
                {{"key_source": "rng", "type": "cpu", "grid_bits": 4}}
            ],
            "consumer": {{
                "store_path": {store:?},
                "hit_file": {hits:?},
                "threads": 1
            }},
            "shutdown_deadline_secs": 10
        }}"#,
        store = store_path,
        hits = hit_path
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    let runner = std::thread::spawn(move || run_find(&config, thread_stop));

    std::thread::sleep(Duration::from_millis(300));
    // Interrupt twice; the second raise must be a no-op.
    stop.store(true, Ordering::SeqCst);
    stop.store(true, Ordering::SeqCst);

    let summary = runner.join().unwrap().unwrap();
    assert!(!summary.forced_termination);
    assert!(summary.keys_checked > 0);
}

#[test]
fn test_startup_fails_on_missing_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = find_config(&format!(
        r#"{{
            "key_sources": [{{"id": "rng", "type": "secure-random"}}],
            "producers": [{{"key_source": "rng", "type": "cpu", "grid_bits": 4}}],
            "consumer": {{
                "store_path": {store:?},
                "hit_file": {hits:?}
            }}
        }}"#,
        store = dir.path().join("missing.ksc"),
        hits = dir.path().join("hits.txt")
    ));

    let stop = Arc::new(AtomicBool::new(false));
    assert!(matches!(
        run_find(&config, stop),
        Err(PipelineError::Store(_))
    ));
}

#[test]
fn test_startup_fails_on_unknown_key_source() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.ksc");
    write_store(&store_path, &[]);

    let config = find_config(&format!(
        r#"{{
            "key_sources": [{{"id": "rng", "type": "secure-random"}}],
            "producers": [{{"key_source": "typo", "type": "cpu", "grid_bits": 4}}],
            "consumer": {{
                "store_path": {store:?},
                "hit_file": {hits:?}
            }}
        }}"#,
        store = store_path,
        hits = dir.path().join("hits.txt")
    ));

    let stop = Arc::new(AtomicBool::new(false));
    assert!(matches!(
        run_find(&config, stop),
        Err(PipelineError::Config(_))
    ));
}

/// Endless source for back-pressure probing.
struct EndlessSource {
    next: Mutex<u64>,
}

impl KeySource for EndlessSource {
    fn id(&self) -> &str {
        "endless"
    }

    fn next_base(&self) -> Option<Scalar> {
        let mut next = self.next.lock().unwrap();
        *next += 1;
        Some(Scalar::from_u64(*next))
    }
}

#[test]
fn test_queue_bounds_producer() {
    // With no consumer draining, a producer can fill the queue to its
    // bound and no further; it sits blocked in the push.
    let capacity = 4;
    let (tx, rx) = crossbeam_channel::bounded::<Batch>(capacity);
    let stop = Arc::new(AtomicBool::new(false));

    let factory: BackendFactory =
        Box::new(|| Ok(Box::new(CpuBackend::new()) as Box<dyn DerivationBackend>));
    let mut producer = Producer::spawn(
        "pressure".to_string(),
        Arc::new(EndlessSource {
            next: Mutex::new(0),
        }),
        ProducerWork::Grid { factory, bits: 0 },
        false,
        false,
        tx,
        Arc::clone(&stop),
    );

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(rx.len(), capacity);

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(rx.len(), capacity, "queue must never exceed its bound");

    // Releasing the queue lets the producer observe the stop flag.
    stop.store(true, Ordering::SeqCst);
    drop(rx);
    for _ in 0..100 {
        if producer.state() == ProducerState::NotRunning {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(producer.state(), ProducerState::NotRunning);
    producer.join();
}
