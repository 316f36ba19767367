mod common;

use common::*;
use segy_core::utils::index_path_for;
use segy_core::{CancelFlag, IndexType, NoopMonitor, SegyError, TraceKey, TraceStore, VolumeConfig};
use std::fs;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;

fn two_by_two(path: &std::path::Path) {
    write_segy(
        path,
        &[
            RawTrace::inline_xline(1, 1, ramp(1.0)),
            RawTrace::inline_xline(1, 2, ramp(2.0)),
            RawTrace::inline_xline(2, 1, ramp(3.0)),
            RawTrace::inline_xline(2, 2, ramp(4.0)),
        ],
    );
}

fn set_mtime(path: &std::path::Path, t: SystemTime) {
    fs::OpenOptions::new().write(true).open(path).unwrap().set_modified(t).unwrap();
}

#[test]
fn index_file_is_created_and_reused() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("v.sgy");
    two_by_two(&p);
    let idx = index_path_for(&p);
    assert!(!idx.exists());

    drop(TraceStore::open(&p, VolumeConfig::default()).unwrap());
    assert!(idx.exists());
    assert_eq!(fs::metadata(&idx).unwrap().len(), 16 + 2 * 16 + 4 * 8);

    // a fresh index is opened as is, even when its grid differs from a rescan
    let mut bytes = fs::read(&idx).unwrap();
    let last = bytes.len() - 8;
    bytes[last..].copy_from_slice(&0i64.to_be_bytes());
    fs::write(&idx, &bytes).unwrap();
    let store = TraceStore::open(&p, VolumeConfig::default()).unwrap();
    assert_eq!(store.lookup(&TraceKey::inline_xline(2, 2)).unwrap(), None);
}

#[test]
fn stale_index_is_rebuilt() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("v.sgy");
    two_by_two(&p);
    let idx = index_path_for(&p);
    drop(TraceStore::open(&p, VolumeConfig::default()).unwrap());

    let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    set_mtime(&idx, old);
    set_mtime(&p, old + Duration::from_secs(10));
    append_trace(&p, &RawTrace::inline_xline(3, 1, ramp(5.0)));

    let store = TraceStore::open(&p, VolumeConfig::default()).unwrap();
    assert_eq!(store.lookup(&TraceKey::inline_xline(3, 1)).unwrap(), Some(trace_offset(4)));
    assert!(fs::metadata(&idx).unwrap().modified().unwrap() > old);
}

#[test]
fn corrupt_index_is_replaced() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("v.sgy");
    two_by_two(&p);
    let idx = index_path_for(&p);
    fs::write(&idx, b"not an index at all").unwrap();

    let store = TraceStore::open(&p, VolumeConfig::default()).unwrap();
    assert_eq!(store.num_traces(), 4);
    assert_eq!(store.lookup(&TraceKey::inline_xline(2, 1)).unwrap(), Some(trace_offset(2)));
}

#[test]
fn index_of_another_type_is_replaced() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("v.sgy");
    two_by_two(&p);
    let mut cdp = VolumeConfig::new(IndexType::PostStack2d);
    // CDP read from the inline word
    cdp.cdp_byte_loc = 189;
    let store = TraceStore::open(&p, cdp).unwrap();
    assert_eq!(store.num_traces(), 2);
    drop(store);

    let store = TraceStore::open(&p, VolumeConfig::default()).unwrap();
    assert_eq!(store.num_traces(), 4);
    assert_eq!(store.key_stats().len(), 2);
}

#[test]
fn invalidate_after_raw_rewrite() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("v.sgy");
    two_by_two(&p);
    let store = TraceStore::open(&p, VolumeConfig::default()).unwrap();
    assert_eq!(store.lookup(&TraceKey::inline_xline(3, 2)).unwrap(), None);

    store.close().unwrap();
    append_trace(&p, &RawTrace::inline_xline(3, 2, ramp(6.0)));
    store.invalidate_index().unwrap();
    assert_eq!(store.lookup(&TraceKey::inline_xline(3, 2)).unwrap(), Some(trace_offset(4)));
    assert_eq!(store.num_traces(), 5);
}

#[test]
fn cancelled_scan_writes_nothing() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("v.sgy");
    two_by_two(&p);
    let flag = CancelFlag::new();
    flag.cancel();
    let err = TraceStore::open_with_monitor(&p, VolumeConfig::default(), &flag).unwrap_err();
    assert!(matches!(err, SegyError::Cancelled));
    assert!(!index_path_for(&p).exists());

    let live = CancelFlag::new();
    let store = TraceStore::open_with_monitor(&p, VolumeConfig::default(), &live).unwrap();
    assert_eq!(live.percent(), 100);
    store.rebuild_index(&NoopMonitor).unwrap();
    assert_eq!(store.num_traces(), 4);
}

#[test]
fn runaway_grid_is_refused() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("v.sgy");
    write_segy(
        &p,
        &[
            RawTrace::inline_xline(1, 1, ramp(1.0)),
            RawTrace::inline_xline(5000, 7000, ramp(2.0)),
            RawTrace::inline_xline(5001, 7001, ramp(3.0)),
        ],
    );
    let mut cfg = VolumeConfig::default();
    cfg.max_index_slots = 1_000_000;
    let err = TraceStore::open(&p, cfg).unwrap_err();
    assert!(matches!(err, SegyError::IndexTooLarge { .. }));
    assert!(!index_path_for(&p).exists());
}
