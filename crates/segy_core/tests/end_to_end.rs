mod common;

use common::*;
use segy_core::{IndexType, KeyRange, SegyError, TraceKey, TraceStatus, TraceStore, VolumeConfig};
use tempfile::tempdir;

/// 3 x 3 grid with (101,202) and (102,200) absent; (100,204) is all zeros.
fn survey(path: &std::path::Path) -> Vec<(TraceKey, u64)> {
    let mut traces = Vec::new();
    let mut expected = Vec::new();
    for il in [100, 101, 102] {
        for xl in [200, 202, 204] {
            if (il, xl) == (101, 202) || (il, xl) == (102, 200) {
                continue;
            }
            let samples = if (il, xl) == (100, 204) { vec![0.0; N_SAMPLES] } else { ramp((il * 1000 + xl) as f32) };
            expected.push((TraceKey::inline_xline(il, xl), trace_offset(traces.len())));
            traces.push(RawTrace::inline_xline(il, xl, samples));
        }
    }
    write_segy(path, &traces);
    expected
}

#[test]
fn poststack_grid_with_missing_traces() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("survey.sgy");
    let expected = survey(&p);
    let store = TraceStore::open(&p, VolumeConfig::new(IndexType::PostStack3d)).unwrap();

    let stats = store.key_stats();
    assert_eq!((stats[0].min, stats[0].max, stats[0].stride), (100, 102, 1));
    assert_eq!((stats[1].min, stats[1].max, stats[1].stride), (200, 204, 2));
    assert_eq!(store.num_traces(), 7);
    assert_eq!(store.entries(), expected);

    let v = store.volume();
    assert_eq!((v.z_start, v.z_delta, v.samples_per_trace), (100.0, 4.0, N_SAMPLES));

    let keys = segy_core::grid(&[KeyRange::new(100, 102, 1), KeyRange::new(200, 204, 2)]).unwrap();
    let traces = store.get_traces(&keys, v.z_start, v.z_end()).unwrap();
    assert_eq!(traces.len(), 9);
    let missing: Vec<_> = traces.iter().filter(|t| t.status == TraceStatus::Missing).collect();
    assert_eq!(missing.len(), 2);
    for t in &missing {
        assert_eq!(t.samples, vec![0.0; N_SAMPLES]);
    }
    assert_eq!(traces.iter().filter(|t| t.status == TraceStatus::Dead).count(), 1);
    assert_eq!(traces.iter().filter(|t| t.status == TraceStatus::Live).count(), 6);

    let t = &traces[1];
    assert_eq!(t.key, TraceKey::inline_xline(100, 202));
    assert_eq!(t.samples, ramp(100_202.0));
    assert_eq!(t.header.get_i32("INLINE"), Some(100));
    assert_eq!(t.header.get_i32("NUM_SAMPLES"), Some(N_SAMPLES as i32));
}

#[test]
fn every_scanned_key_resolves_to_its_offset() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("survey.sgy");
    let expected = survey(&p);
    let store = TraceStore::open(&p, VolumeConfig::default()).unwrap();
    for (key, off) in &expected {
        assert_eq!(store.lookup(key).unwrap(), Some(*off));
    }
    assert_eq!(store.lookup(&TraceKey::inline_xline(101, 202)).unwrap(), None);
    assert_eq!(store.lookup(&TraceKey::inline_xline(103, 200)).unwrap(), None);
    assert_eq!(store.lookup(&TraceKey::inline_xline(100, 201)).unwrap(), None);
}

#[test]
fn missing_traces_do_no_reads() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("survey.sgy");
    survey(&p);
    let store = TraceStore::open(&p, VolumeConfig::default()).unwrap();
    let before = store.accessor().lock().read_count();
    let out = store
        .get_traces(&[TraceKey::inline_xline(101, 202), TraceKey::inline_xline(500, 500)], 104.0, 112.0)
        .unwrap();
    assert_eq!(store.accessor().lock().read_count(), before);
    assert!(out.iter().all(|t| t.is_missing() && t.samples == vec![0.0; 3]));
    assert_eq!(out[0].z_start, 104.0);

    store.get_traces(&[TraceKey::inline_xline(100, 200)], 104.0, 112.0).unwrap();
    assert!(store.accessor().lock().read_count() > before);
}

#[test]
fn z_window_is_sliced_and_range_checked() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("survey.sgy");
    survey(&p);
    let store = TraceStore::open(&p, VolumeConfig::default()).unwrap();
    let k = TraceKey::inline_xline(100, 200);

    let t = store.get_traces(&[k], 108.0, 116.0).unwrap().remove(0);
    assert_eq!(t.samples, ramp(100_200.0)[2..5].to_vec());
    assert_eq!(t.z_start, 108.0);

    for (a, b) in [(96.0, 116.0), (100.0, 132.0), (120.0, 110.0)] {
        assert!(matches!(store.get_traces(&[k], a, b), Err(SegyError::Range(_))));
    }
    // the session survives a rejected call
    store.close().unwrap();
    assert_eq!(store.get_traces(&[k], 100.0, 128.0).unwrap()[0].samples, ramp(100_200.0));
    store.close().unwrap();
}

#[test]
fn unassigned_headers_are_not_indexed() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("zeros.sgy");
    write_segy(
        &p,
        &[
            RawTrace::inline_xline(10, 20, ramp(1.0)),
            RawTrace::inline_xline(0, 20, ramp(2.0)),
            RawTrace::inline_xline(11, 0, ramp(3.0)),
            RawTrace::inline_xline(11, 21, ramp(4.0)),
        ],
    );
    let store = TraceStore::open(&p, VolumeConfig::default()).unwrap();
    assert_eq!(store.num_traces(), 2);
    assert_eq!(store.lookup(&TraceKey::inline_xline(11, 21)).unwrap(), Some(trace_offset(3)));
}
