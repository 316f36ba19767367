//! Keyed trace access over one SEG-Y file and its index.
//!
//! Lock order is always session token, then index. Every get/put call holds
//! the session token for its whole duration, so concurrent calls on one store
//! are serialized.

use crate::accessor::{AccessMode, FileAccessor, FileSession};
use crate::config::VolumeConfig;
use crate::consts::{BINARY_HEADER_SIZE, TEXT_HEADER_SIZE, TRACE_HEADER_SIZE};
use crate::errors::{Result, SegyError};
use crate::header::{names, FieldValues, HeaderBuffer, HeaderCatalog};
use crate::index::TraceIndex;
use crate::indexer::{NoopMonitor, ScanMonitor, TraceIndexBuilder};
use crate::keys::{default_key_fn, grid, KeyFn, KeyRange, KeyStats, TraceKey};
use crate::samples::{decode, encode, SampleFormat};
use crate::trace::{classify, Trace};
use crate::utils::{fsync_dir, index_path_for};
use crate::volume::{data_offset, VolumeInfo, VolumeLayout};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct TraceStore {
    data_path: PathBuf,
    index_path: PathBuf,
    config: VolumeConfig,
    catalog: HeaderCatalog,
    volume: VolumeInfo,
    key_fn: KeyFn,
    accessor: FileAccessor,
    index: Mutex<TraceIndex>,
    #[cfg(test)]
    read_delay: std::sync::atomic::AtomicU64,
}

impl std::fmt::Debug for TraceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceStore")
            .field("data_path", &self.data_path)
            .field("index_type", &self.config.index_type)
            .finish()
    }
}

impl TraceStore {
    pub fn open(path: impl AsRef<Path>, config: VolumeConfig) -> Result<Self> {
        Self::open_with_monitor(path, config, &NoopMonitor)
    }

    pub fn open_with_monitor(path: impl AsRef<Path>, config: VolumeConfig, monitor: &dyn ScanMonitor) -> Result<Self> {
        let key_fn = default_key_fn(config.index_type);
        Self::open_with(path, config, key_fn, monitor)
    }

    /// Opens with a custom key extractor. The index is reused when fresh and
    /// valid, otherwise deleted and rebuilt by a full scan.
    pub fn open_with(
        path: impl AsRef<Path>,
        config: VolumeConfig,
        key_fn: KeyFn,
        monitor: &dyn ScanMonitor,
    ) -> Result<Self> {
        config.validate()?;
        let data_path = path.as_ref().to_path_buf();
        let index_path = index_path_for(&data_path);
        let catalog = config.trace_catalog()?;
        let accessor = FileAccessor::new(&data_path);
        let (volume, index) = {
            let mut s = accessor.lock();
            s.open_for_read()?;
            let volume = read_volume(&mut s, &config)?;
            let index = load_or_build(&mut s, &index_path, &config, &volume, &catalog, &key_fn, monitor)?;
            (volume, index)
        };
        tracing::info!(
            path = %data_path.display(),
            index_type = %config.index_type,
            traces = index.num_traces(),
            format = volume.sample_format.name(),
            "store opened"
        );
        Ok(Self {
            data_path,
            index_path,
            config,
            catalog,
            volume,
            key_fn,
            accessor,
            index: Mutex::new(index),
            #[cfg(test)]
            read_delay: Default::default(),
        })
    }

    /// Creates a new, empty volume whose index grid is given by `key_ranges`,
    /// one range per key dimension. Fails if the data file exists.
    pub fn create(
        path: impl AsRef<Path>,
        config: VolumeConfig,
        layout: &VolumeLayout,
        key_ranges: &[KeyRange],
    ) -> Result<Self> {
        config.validate()?;
        let arity = config.index_type.arity();
        if key_ranges.len() != arity {
            return Err(SegyError::InvalidInput(format!(
                "{} index needs {arity} key ranges, got {}",
                config.index_type,
                key_ranges.len()
            )));
        }
        let data_path = path.as_ref().to_path_buf();
        let index_path = index_path_for(&data_path);
        let catalog = config.trace_catalog()?;
        let volume = VolumeInfo::from_layout(layout, &config)?;
        let stats = config
            .key_byte_locs()
            .into_iter()
            .zip(key_ranges)
            .map(|(loc, r)| KeyStats::from_range(loc, *r))
            .collect::<Result<Vec<_>>>()?;

        let (text, binary) = layout.header_bytes()?;
        debug_assert_eq!(text.len() + binary.len(), TEXT_HEADER_SIZE + BINARY_HEADER_SIZE);
        let mut f = OpenOptions::new().write(true).create_new(true).open(&data_path)?;
        f.write_all(&text)?;
        f.write_all(&binary)?;
        f.sync_all()?;
        drop(f);
        fsync_dir(&data_path)?;

        let index = TraceIndex::create(&index_path, config.index_type, &stats, &[], config.max_index_slots)?;
        let accessor = FileAccessor::new(&data_path);
        accessor.open_for_write()?;
        tracing::info!(path = %data_path.display(), slots = index.slot_count(), "volume created");
        Ok(Self {
            data_path,
            index_path,
            key_fn: default_key_fn(config.index_type),
            config,
            catalog,
            volume,
            accessor,
            index: Mutex::new(index),
            #[cfg(test)]
            read_delay: Default::default(),
        })
    }

    pub fn data_path(&self) -> &Path { &self.data_path }
    pub fn index_path(&self) -> &Path { &self.index_path }
    pub fn config(&self) -> &VolumeConfig { &self.config }
    pub fn catalog(&self) -> &HeaderCatalog { &self.catalog }
    pub fn volume(&self) -> &VolumeInfo { &self.volume }
    pub fn accessor(&self) -> &FileAccessor { &self.accessor }

    pub fn key_stats(&self) -> Vec<KeyStats> { self.index().keys().to_vec() }
    pub fn num_traces(&self) -> u64 { self.index().num_traces() }

    /// Every indexed key with its byte offset, in slot order.
    pub fn entries(&self) -> Vec<(TraceKey, u64)> { self.index().entries().collect() }

    pub fn lookup(&self, key: &TraceKey) -> Result<Option<u64>> {
        self.check_arity(key)?;
        Ok(self.index().lookup(key))
    }

    /// Reads the traces at `keys` over `[z_start, z_end]`. Absent keys yield
    /// Missing traces without touching the file.
    pub fn get_traces(&self, keys: &[TraceKey], z_start: f32, z_end: f32) -> Result<Vec<Trace>> {
        let (i0, i1) = self.volume.window(z_start, z_end)?;
        for k in keys {
            self.check_arity(k)?;
        }
        let win_start = self.volume.z_start + i0 as f32 * self.volume.z_delta;
        let len = i1 - i0 + 1;

        let mut s = self.accessor.lock();
        if s.mode() == AccessMode::Closed {
            s.open_for_read()?;
        }
        let index = self.index();
        let mut out = Vec::with_capacity(keys.len());
        let mut header = vec![0u8; TRACE_HEADER_SIZE];
        let mut raw = vec![0u8; self.volume.trace_bytes()];
        for key in keys {
            let Some(offset) = index.lookup(key) else {
                out.push(Trace::missing(*key, win_start, self.volume.z_delta, len).with_header(self.key_fields(key)));
                continue;
            };
            s.read_buffer_at(&mut header, offset)?;
            self.delay();
            s.read_buffer(&mut raw)?;

            let mut values = HeaderBuffer::from_bytes(&self.catalog, &header)?.sync_from_bytes()?;
            for (name, v) in self.index_names().iter().zip(key.as_slice()) {
                values.set_i32(*name, *v);
            }
            let mut samples = decode(&raw, self.volume.sample_format, self.volume.byte_order);
            samples.truncate(i1 + 1);
            samples.drain(..i0);
            let status = classify(&samples);
            out.push(Trace {
                key: *key,
                z_start: win_start,
                z_delta: self.volume.z_delta,
                samples,
                status,
                header: values,
            });
        }
        tracing::debug!(keys = keys.len(), "get_traces");
        Ok(out)
    }

    /// The whole stored window of one trace.
    pub fn get_trace(&self, key: &TraceKey) -> Result<Trace> {
        let mut v = self.get_traces(std::slice::from_ref(key), self.volume.z_start, self.volume.z_end())?;
        v.pop().ok_or_else(|| SegyError::InvalidInput("empty result".into()))
    }

    /// Every key of a per-dimension range grid, last dimension fastest.
    pub fn get_brick(&self, ranges: &[KeyRange], z_start: f32, z_end: f32) -> Result<Vec<Trace>> {
        let keys = grid(ranges)?;
        self.get_traces(&keys, z_start, z_end)
    }

    /// Writes traces at their keys, overwriting in place or appending at the
    /// end of the file. Missing traces are skipped.
    pub fn put_traces(&self, traces: &[Trace]) -> Result<()> {
        if self.volume.sample_format == SampleFormat::Fixed32WithGain {
            return Err(SegyError::UnsupportedFormat(format!(
                "writing {}",
                self.volume.sample_format.name()
            )));
        }
        let n = self.volume.samples_per_trace;
        let mut placed = Vec::with_capacity(traces.len());
        for t in traces.iter().filter(|t| !t.is_missing()) {
            self.check_arity(&t.key)?;
            let at = self.volume.sample_index(t.z_start);
            if at < 0 || at as usize + t.samples.len() > n {
                return Err(SegyError::Range(format!(
                    "trace {} window [{}, {}] outside stored [{}, {}]",
                    t.key,
                    t.z_start,
                    t.z_end(),
                    self.volume.z_start,
                    self.volume.z_end()
                )));
            }
            placed.push((t, at as usize));
        }

        let mut s = self.accessor.lock();
        if s.mode() != AccessMode::Write {
            s.open_for_write()?;
        }
        let mut index = self.index();
        for (t, at) in placed {
            if !index.contains_key(&t.key) {
                return Err(SegyError::Range(format!("key {} outside the index grid", t.key)));
            }
            let record = self.encode_record(t, at)?;
            let offset = match index.lookup(&t.key) {
                Some(off) => off,
                None => s.eof_position()?,
            };
            s.write_buffer_at(&record, offset)?;
            index.store(&t.key, offset)?;
        }
        index.flush()?;
        index.touch()?;
        tracing::debug!(traces = traces.len(), "put_traces");
        Ok(())
    }

    /// Deletes the index and rebuilds it from a full scan.
    pub fn invalidate_index(&self) -> Result<()> {
        self.rebuild_index(&NoopMonitor)
    }

    pub fn rebuild_index(&self, monitor: &dyn ScanMonitor) -> Result<()> {
        let mut s = self.accessor.lock();
        if s.mode() == AccessMode::Closed {
            s.open_for_read()?;
        }
        let mut index = self.index();
        tracing::info!(path = %self.index_path.display(), "index invalidated");
        TraceIndex::delete(&self.index_path)?;
        *index = build_index(&mut s, &self.index_path, &self.config, &self.volume, &self.catalog, &self.key_fn, monitor)?;
        Ok(())
    }

    /// Closes the data file and marks the index fresh. Safe to call twice.
    pub fn close(&self) -> Result<()> {
        let mut s = self.accessor.lock();
        s.close()?;
        let index = self.index();
        index.flush()?;
        index.touch()?;
        Ok(())
    }

    fn index(&self) -> MutexGuard<'_, TraceIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn index_names(&self) -> &'static [&'static str] { self.config.index_type.key_names() }

    fn check_arity(&self, key: &TraceKey) -> Result<()> {
        let arity = self.config.index_type.arity();
        if key.arity() != arity {
            return Err(SegyError::InvalidInput(format!(
                "key {key} has {} components, {} needs {arity}",
                key.arity(),
                self.config.index_type
            )));
        }
        Ok(())
    }

    fn key_fields(&self, key: &TraceKey) -> FieldValues {
        let mut v = FieldValues::new();
        for (name, k) in self.index_names().iter().zip(key.as_slice()) {
            v.set_i32(*name, *k);
        }
        v
    }

    /// 240-byte header followed by the full-length sample block.
    fn encode_record(&self, t: &Trace, at: usize) -> Result<Vec<u8>> {
        let vol = &self.volume;
        let mut values = t.header.clone();
        for (name, k) in self.index_names().iter().zip(t.key.as_slice()) {
            values.set_i32(*name, *k);
        }
        values.set_i16(names::DELAY_RECORDING_TIME, vol.z_start.round() as i16);
        values.set_i16(names::NUM_SAMPLES, vol.samples_per_trace as u16 as i16);
        values.set_i16(names::SAMPLE_INTERVAL, (vol.z_delta * 1000.0).round() as u16 as i16);
        let mut header = HeaderBuffer::new(&self.catalog);
        header.sync_to_bytes(&values)?;

        let mut full = vec![0.0f32; vol.samples_per_trace];
        full[at..at + t.samples.len()].copy_from_slice(&t.samples);
        let mut record = header.into_bytes();
        record.extend_from_slice(&encode(&full, vol.sample_format, vol.byte_order)?);
        Ok(record)
    }

    #[cfg(test)]
    fn delay(&self) {
        let ms = self.read_delay.load(std::sync::atomic::Ordering::Relaxed);
        if ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(ms));
        }
    }

    #[cfg(not(test))]
    #[inline]
    fn delay(&self) {}
}

impl Drop for TraceStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "closing store failed");
        }
    }
}

fn read_volume(s: &mut FileSession, config: &VolumeConfig) -> Result<VolumeInfo> {
    let file_len = s.file_size()?;
    if file_len < (TEXT_HEADER_SIZE + BINARY_HEADER_SIZE) as u64 {
        return Err(SegyError::InvalidInput(format!(
            "{} is {file_len} bytes, too short for SEG-Y headers",
            s.path().display()
        )));
    }
    let mut text = vec![0u8; TEXT_HEADER_SIZE];
    let mut binary = vec![0u8; BINARY_HEADER_SIZE];
    s.read_buffer_at(&mut text, 0)?;
    s.read_buffer(&mut binary)?;

    let data_offset = data_offset(&binary)?;
    let first = if file_len >= data_offset + TRACE_HEADER_SIZE as u64 {
        let mut th = vec![0u8; TRACE_HEADER_SIZE];
        s.read_buffer_at(&mut th, data_offset)?;
        Some(th)
    } else {
        None
    };
    VolumeInfo::from_headers(&text, &binary, first.as_deref(), file_len, config)
}

fn load_or_build(
    s: &mut FileSession,
    index_path: &Path,
    config: &VolumeConfig,
    volume: &VolumeInfo,
    catalog: &HeaderCatalog,
    key_fn: &KeyFn,
    monitor: &dyn ScanMonitor,
) -> Result<TraceIndex> {
    if index_path.exists() {
        if TraceIndex::is_stale(index_path, s.path())? {
            tracing::warn!(path = %index_path.display(), "index older than data file; rebuilding");
        } else {
            match TraceIndex::open(index_path, config.index_type) {
                Ok(ix) => return Ok(ix),
                Err(e) if e.needs_rebuild() => {
                    tracing::warn!(path = %index_path.display(), error = %e, "bad index deleted; rebuilding");
                }
                Err(e) => return Err(e),
            }
        }
        TraceIndex::delete(index_path)?;
    }
    build_index(s, index_path, config, volume, catalog, key_fn, monitor)
}

fn build_index(
    s: &mut FileSession,
    index_path: &Path,
    config: &VolumeConfig,
    volume: &VolumeInfo,
    catalog: &HeaderCatalog,
    key_fn: &KeyFn,
    monitor: &dyn ScanMonitor,
) -> Result<TraceIndex> {
    let mut builder = TraceIndexBuilder::new(config.index_type, &config.key_byte_locs(), config.max_index_slots)?;
    builder.scan(s, volume, catalog, key_fn, monitor)?;
    tracing::info!(path = %index_path.display(), traces = builder.len(), dropped = builder.dropped(), "index built");
    builder.finish(index_path)
}
