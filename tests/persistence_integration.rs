mod common;

use anacore::persistence::{read_snapshot, SNAPSHOT_FORMAT_VERSION};
use anacore::{Arguments, EngineConfig, KeyValue, Runnable, Session};
use common::{no_args, program_registry, program_session, Lifted, Program};
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_snapshot_round_trip_restores_records_as_hits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("analyses.json");

    let calls = Arc::new(AtomicUsize::new(0));
    let original = program_session(&calls);
    original.analyze("Summary", no_args()).unwrap();
    original.save_snapshot(&path).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let restored_calls = Arc::new(AtomicUsize::new(0));
    let restored = program_session(&restored_calls);
    assert_eq!(restored.load_snapshot(&path).unwrap(), 3);

    let summary = restored.analyze("Summary", no_args()).unwrap();
    assert_eq!(
        summary.downcast_ref::<String>().unwrap(),
        "80 bytes, 3 blocks lifted"
    );
    let lifted = restored.analyze("Lifted", no_args()).unwrap();
    assert_eq!(
        lifted.downcast_ref::<Lifted>().unwrap().addrs,
        vec![0x1000, 0x1020, 0x1040]
    );
    assert_eq!(lifted.named_errors().len(), 2);
    assert!(!lifted.fail_fast());

    // Nothing was recomputed.
    assert_eq!(restored_calls.load(Ordering::SeqCst), 0);
    assert_eq!(restored.cache_stats().hits, 2);
}

#[test]
fn test_snapshot_omits_backtraces() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("analyses.json");

    let calls = Arc::new(AtomicUsize::new(0));
    let session = program_session(&calls);
    let live = session.analyze("Lifted", no_args()).unwrap();
    assert!(live.named_errors().values().all(|e| e.backtrace.is_some()));
    session.save_snapshot(&path).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("backtrace"));

    let snapshot = read_snapshot(&path).unwrap();
    assert_eq!(snapshot.format_version, SNAPSHOT_FORMAT_VERSION);
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(
        snapshot.records[0].named_errors["0x1010"].message,
        "undecodable block at 0x1010"
    );

    let restored = program_session(&calls);
    restored.load_snapshot(&path).unwrap();
    let record = restored.cached("Lifted", &no_args()).unwrap().unwrap();
    assert!(record.named_errors().values().all(|e| e.backtrace.is_none()));
}

#[test]
fn test_load_keeps_existing_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("analyses.json");

    let calls = Arc::new(AtomicUsize::new(0));
    let first = program_session(&calls);
    first.analyze("Size", no_args()).unwrap();
    first.analyze("Lifted", no_args()).unwrap();
    first.save_snapshot(&path).unwrap();

    let second = program_session(&calls);
    let live = second.analyze("Size", no_args()).unwrap();
    assert_eq!(second.load_snapshot(&path).unwrap(), 1);

    let after = second.cached("Size", &no_args()).unwrap().unwrap();
    assert!(Arc::ptr_eq(&live, &after));
}

#[test]
fn test_imported_records_are_not_validated_against_project() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("analyses.json");

    let calls = Arc::new(AtomicUsize::new(0));
    let source = program_session(&calls);
    source.analyze("Size", no_args()).unwrap();
    source.save_snapshot(&path).unwrap();

    let empty = Session::with_registry(Program { blocks: vec![] }, program_registry(&calls));
    empty.load_snapshot(&path).unwrap();
    let size = empty.analyze("Size", no_args()).unwrap();
    assert_eq!(size.downcast_ref::<u64>(), Some(&0x50));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_persist_and_restore_use_configured_cache_file() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        cache_file: Some(dir.path().join("state").join("cache.json")),
        pretty_snapshots: true,
        ..EngineConfig::default()
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let session = program_session(&calls).with_config(config.clone());
    assert_eq!(session.restore().unwrap(), 0);
    session.analyze("Size", no_args()).unwrap();
    assert!(session.persist().unwrap());

    let raw = fs::read_to_string(config.cache_file.as_ref().unwrap()).unwrap();
    assert!(raw.contains("\n  \"format_version\": 1"));

    let restored = program_session(&calls).with_config(config);
    assert_eq!(restored.restore().unwrap(), 1);
}

#[test]
fn test_persist_without_cache_file_is_a_no_op() {
    let calls = Arc::new(AtomicUsize::new(0));
    let session = program_session(&calls);
    session.analyze("Size", no_args()).unwrap();
    assert!(!session.persist().unwrap());
    assert_eq!(session.restore().unwrap(), 0);
}

#[test]
fn test_load_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("analyses.json");
    fs::write(&path, "{not json").unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let err = program_session(&calls).load_snapshot(&path).unwrap_err();
    assert!(err.to_string().starts_with("Invalid snapshot"));
}

fn float_registry() -> Arc<anacore::AnalysisRegistry> {
    let registry = Arc::new(anacore::AnalysisRegistry::new());
    registry.register(
        "Scaled",
        Runnable::function(|ctx| {
            let scale = ctx.kwarg("scale").and_then(KeyValue::as_f64).unwrap_or(1.0);
            // JSON has no infinities; keep those results out of band
            Ok(scale.is_finite().then(|| scale * 3.0))
        }),
        vec![],
        true,
    );
    registry
}

#[test]
fn test_float_keys_and_results_survive_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("analyses.json");
    let scales = [
        1.0715660391465826e-75,
        0.1,
        2.2250738585072014e-308 / 3.0,
        f64::INFINITY,
        f64::NEG_INFINITY,
    ];

    let session = Session::with_registry((), float_registry());
    for scale in scales {
        session
            .analyze("Scaled", Arguments::new().kwarg("scale", scale))
            .unwrap();
    }
    session.save_snapshot(&path).unwrap();

    let restored = Session::with_registry((), float_registry());
    assert_eq!(restored.load_snapshot(&path).unwrap(), scales.len());

    for scale in scales {
        let args = Arguments::new().kwarg("scale", scale);
        let record = restored.cached("Scaled", &args).unwrap();
        assert!(record.is_some(), "no hit for scale {scale:e}");
        let result = *record.unwrap().downcast_ref::<Option<f64>>().unwrap();
        match result {
            Some(value) => assert_eq!(value.to_bits(), (scale * 3.0).to_bits()),
            None => assert!(scale.is_infinite()),
        }
    }
    assert_eq!(restored.cache_stats().misses, 0);
}
