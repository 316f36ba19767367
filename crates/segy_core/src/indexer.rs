//! One-pass scanner that builds a `TraceIndex` from a data file.

use crate::accessor::FileSession;
use crate::consts::TRACE_HEADER_SIZE;
use crate::errors::{Result, SegyError};
use crate::header::{names, HeaderBuffer, HeaderCatalog};
use crate::index::{slot_count, TraceIndex};
use crate::keys::{IndexType, KeyFn, KeyStats, TraceKey};
use crate::volume::VolumeInfo;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Progress and cancellation sink, polled once per trace.
pub trait ScanMonitor {
    fn worked(&self, _percent: u8) {}
    fn is_cancelled(&self) -> bool { false }
}

pub struct NoopMonitor;
impl ScanMonitor for NoopMonitor {}

/// Shareable cancel switch that also records the last reported progress.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    percent: Arc<AtomicU8>,
}

impl CancelFlag {
    pub fn new() -> Self { Self::default() }
    pub fn cancel(&self) { self.cancelled.store(true, Ordering::SeqCst); }
    pub fn percent(&self) -> u8 { self.percent.load(Ordering::Relaxed) }
}

impl ScanMonitor for CancelFlag {
    fn worked(&self, percent: u8) { self.percent.store(percent, Ordering::Relaxed); }
    fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::SeqCst) }
}

pub struct TraceIndexBuilder {
    index_type: IndexType,
    stats: Vec<KeyStats>,
    entries: Vec<(TraceKey, u64)>,
    dropped: u64,
    max_slots: u64,
}

impl TraceIndexBuilder {
    /// `byte_locs` are the 1-based key locations, one per key dimension.
    pub fn new(index_type: IndexType, byte_locs: &[i32], max_slots: u64) -> Result<Self> {
        if index_type == IndexType::Unknown || byte_locs.len() != index_type.arity() {
            return Err(SegyError::InvalidInput(format!(
                "{index_type} index needs {} byte locations, got {}",
                index_type.arity(),
                byte_locs.len()
            )));
        }
        Ok(Self {
            index_type,
            stats: byte_locs.iter().map(|b| KeyStats::new(*b)).collect(),
            entries: Vec::new(),
            dropped: 0,
            max_slots,
        })
    }

    pub fn index_type(&self) -> IndexType { self.index_type }
    pub fn stats(&self) -> &[KeyStats] { &self.stats }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn dropped(&self) -> u64 { self.dropped }

    /// Records one trace. Returns false when the trace is left out of the index.
    pub fn push(&mut self, key: TraceKey, offset: u64) -> bool {
        if key.arity() != self.stats.len() {
            tracing::warn!(%key, offset, "key arity does not match the index; trace dropped");
            self.dropped += 1;
            return false;
        }
        if !key.is_assigned() {
            tracing::warn!(%key, offset, "unassigned trace header");
            self.dropped += 1;
            return false;
        }
        for (s, v) in self.stats.iter_mut().zip(key.as_slice()) {
            s.observe(*v);
        }
        self.entries.push((key, offset));
        true
    }

    /// Reads every trace header from `volume.data_offset` to the end of the
    /// file. Sample data is skipped using each trace's NUM_SAMPLES (volume
    /// default when zero).
    pub fn scan<M: ScanMonitor + ?Sized>(
        &mut self,
        session: &mut FileSession,
        volume: &VolumeInfo,
        catalog: &HeaderCatalog,
        key_fn: &KeyFn,
        monitor: &M,
    ) -> Result<()> {
        let file_len = session.file_size()?;
        let width = volume.sample_format.byte_width() as u64;
        let start = volume.data_offset;
        let span = file_len.saturating_sub(start).max(1);
        let mut pos = start;
        let mut last_pct = 0u8;
        let mut buf = vec![0u8; TRACE_HEADER_SIZE];
        let mut traces = 0u64;

        while pos + TRACE_HEADER_SIZE as u64 <= file_len {
            if monitor.is_cancelled() {
                tracing::warn!(traces, "index scan cancelled");
                return Err(SegyError::Cancelled);
            }
            session.read_buffer_at(&mut buf, pos)?;
            let header = HeaderBuffer::from_bytes(catalog, &buf)?;
            let fields = header.sync_from_bytes()?;
            let n = match fields.get_i32(names::NUM_SAMPLES).map(|v| v as u16 as u64) {
                Some(n) if n > 0 => n,
                _ => volume.samples_per_trace as u64,
            };
            let next = pos + TRACE_HEADER_SIZE as u64 + n * width;
            if next > file_len {
                tracing::warn!(offset = pos, "truncated trace at end of file; ignored");
                break;
            }
            match key_fn(&fields) {
                Some(key) => {
                    self.push(key, pos);
                }
                None => {
                    tracing::warn!(offset = pos, "no key for trace header; trace dropped");
                    self.dropped += 1;
                }
            }
            traces += 1;
            pos = next;

            let pct = ((pos - start) * 100 / span).min(100) as u8;
            if pct != last_pct {
                last_pct = pct;
                monitor.worked(pct);
            }
        }
        monitor.worked(100);
        tracing::debug!(traces, indexed = self.entries.len(), dropped = self.dropped, "scan finished");
        Ok(())
    }

    /// Writes the index file. Stride 0 (a single value seen) is stored as 1.
    pub fn finish(self, path: &Path) -> Result<TraceIndex> {
        let slots = slot_count(&self.stats).unwrap_or(u64::MAX);
        if slots > self.max_slots {
            return Err(SegyError::IndexTooLarge { slots, limit: self.max_slots });
        }
        TraceIndex::create(path, self.index_type, &self.stats, &self.entries, self.max_slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn push_tracks_stats_and_drops_bad_keys() {
        let mut b = TraceIndexBuilder::new(IndexType::PostStack3d, &[189, 193], 1 << 20).unwrap();
        assert!(b.push(TraceKey::inline_xline(100, 200), 3600));
        assert!(b.push(TraceKey::inline_xline(102, 204), 4000));
        assert!(!b.push(TraceKey::inline_xline(0, 204), 4400));
        assert!(!b.push(TraceKey::cdp(7), 4800));
        assert_eq!(b.len(), 2);
        assert_eq!(b.dropped(), 2);
        assert_eq!((b.stats()[0].min, b.stats()[0].max, b.stats()[0].stride), (100, 102, 2));
        assert_eq!((b.stats()[1].min, b.stats()[1].max, b.stats()[1].stride), (200, 204, 4));

        let dir = tempdir().unwrap();
        let ix = b.finish(&dir.path().join("a.ndx")).unwrap();
        assert_eq!(ix.slot_count(), 4);
        assert_eq!(ix.lookup(&TraceKey::inline_xline(102, 204)), Some(4000));
    }

    #[test]
    fn runaway_grid_is_rejected() {
        let mut b = TraceIndexBuilder::new(IndexType::PostStack2d, &[21], 100).unwrap();
        b.push(TraceKey::cdp(1), 3600);
        b.push(TraceKey::cdp(1000), 4000);
        b.push(TraceKey::cdp(1001), 4400);
        let dir = tempdir().unwrap();
        let p = dir.path().join("a.ndx");
        assert!(matches!(b.finish(&p), Err(SegyError::IndexTooLarge { slots: 1001, limit: 100 })));
        assert!(!p.exists());
    }

    #[test]
    fn builder_needs_matching_locations() {
        assert!(TraceIndexBuilder::new(IndexType::PreStack3d, &[189, 193], 10).is_err());
        assert!(TraceIndexBuilder::new(IndexType::Unknown, &[], 10).is_err());
    }

    #[test]
    fn cancel_flag_reports() {
        let f = CancelFlag::new();
        let g = f.clone();
        assert!(!f.is_cancelled());
        g.worked(42);
        g.cancel();
        assert!(f.is_cancelled());
        assert_eq!(f.percent(), 42);
    }
}
