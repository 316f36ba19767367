#![allow(dead_code)]

use std::fs;
use std::path::Path;

pub const N_SAMPLES: usize = 8;
pub const INTERVAL_US: i16 = 4000;
pub const DELAY_MS: i16 = 100;

/// One trace: (1-based byte location, i32 value) header words plus samples.
pub struct RawTrace {
    pub words: Vec<(usize, i32)>,
    pub samples: Vec<f32>,
}

impl RawTrace {
    pub fn inline_xline(il: i32, xl: i32, samples: Vec<f32>) -> Self {
        Self { words: vec![(189, il), (193, xl)], samples }
    }
}

pub fn ramp(seed: f32) -> Vec<f32> { (0..N_SAMPLES).map(|i| seed + i as f32 * 0.5).collect() }

fn put_i16(buf: &mut [u8], off: usize, v: i16) { buf[off..off + 2].copy_from_slice(&v.to_be_bytes()); }
fn put_i32(buf: &mut [u8], off: usize, v: i32) { buf[off..off + 4].copy_from_slice(&v.to_be_bytes()); }

pub fn file_headers(format_code: i16, ext_headers: i16) -> Vec<u8> {
    let mut out = vec![0x40u8; 3200];
    out[0] = 0xc3; // 'C'
    let mut bin = vec![0u8; 400];
    put_i16(&mut bin, 16, INTERVAL_US);
    put_i16(&mut bin, 20, N_SAMPLES as i16);
    put_i16(&mut bin, 24, format_code);
    put_i16(&mut bin, 54, 1);
    put_i16(&mut bin, 304, ext_headers);
    out.extend_from_slice(&bin);
    for _ in 0..ext_headers.max(0) {
        out.extend(std::iter::repeat(0x40u8).take(3200));
    }
    out
}

pub fn trace_record(t: &RawTrace) -> Vec<u8> {
    let bytes: Vec<u8> = t.samples.iter().flat_map(|s| s.to_be_bytes()).collect();
    raw_record(&t.words, t.samples.len(), &bytes)
}

/// A trace header with the given words followed by already encoded samples.
pub fn raw_record(words: &[(usize, i32)], n_samples: usize, sample_bytes: &[u8]) -> Vec<u8> {
    let mut h = vec![0u8; 240];
    for (loc, v) in words {
        put_i32(&mut h, loc - 1, *v);
    }
    put_i16(&mut h, 108, DELAY_MS);
    put_i16(&mut h, 114, n_samples as i16);
    put_i16(&mut h, 116, INTERVAL_US);
    h.extend_from_slice(sample_bytes);
    h
}

/// IEEE big-endian volume, no extended headers.
pub fn write_segy(path: &Path, traces: &[RawTrace]) {
    let mut out = file_headers(5, 0);
    for t in traces {
        out.extend_from_slice(&trace_record(t));
    }
    fs::write(path, out).unwrap();
}

pub fn append_trace(path: &Path, t: &RawTrace) {
    let mut out = fs::read(path).unwrap();
    out.extend_from_slice(&trace_record(t));
    fs::write(path, out).unwrap();
}

/// Byte offset of trace `i` in a file written by `write_segy`.
pub fn trace_offset(i: usize) -> u64 { 3600 + (i * (240 + N_SAMPLES * 4)) as u64 }
