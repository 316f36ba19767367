//! Persistent dense trace index (`<data>.ndx`).
//!
//! Layout (big-endian):
//!   i32 version (101)
//!   i32 type code (0=unknown, 1=CDP, 2=inline/xline, 3=inline/xline/offset)
//!   i32 number of traces stored
//!   i32 number of keys
//!   repeat keys * { i32 byte_loc, i32 min, i32 max, i32 stride }
//!   repeat Π size * { i64 offset }   (0 = no trace)
//!
//! Slots are row-major, the last key varying fastest. The file is mapped
//! read-write for the life of a store session.

use crate::consts::{ABSENT_OFFSET, INDEX_FIXED_HDR, INDEX_KEY_HDR, INDEX_SLOT_SIZE, INDEX_VERSION, MAX_KEYS};
use crate::errors::{Result, SegyError};
use crate::keys::{IndexType, KeyStats, TraceKey};
use crate::utils::{fsync_dir, read_i32, write_i32};
use memmap2::MmapMut;
use std::fs::{self, File, OpenOptions};
use std::io::{Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;

const NUM_TRACES_POS: usize = 8;

/// Π size over the keys, or None when it overflows.
pub fn slot_count(keys: &[KeyStats]) -> Option<u64> {
    keys.iter().try_fold(1u64, |acc, k| acc.checked_mul(k.size()))
}

fn data_start(num_keys: usize) -> usize { INDEX_FIXED_HDR + num_keys * INDEX_KEY_HDR }

pub struct TraceIndex {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    index_type: IndexType,
    keys: Vec<KeyStats>,
    // slots per step of each dimension
    pitch: [u64; MAX_KEYS],
    slots: u64,
    num_traces: u64,
}

impl std::fmt::Debug for TraceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceIndex")
            .field("path", &self.path)
            .field("index_type", &self.index_type)
            .field("keys", &self.keys)
            .field("slots", &self.slots)
            .field("num_traces", &self.num_traces)
            .finish()
    }
}

impl TraceIndex {
    /// Writes a new index file atomically, then opens it. `entries` are placed
    /// in order; a key seen twice keeps its first offset.
    pub fn create(
        path: impl AsRef<Path>,
        index_type: IndexType,
        keys: &[KeyStats],
        entries: &[(TraceKey, u64)],
        max_slots: u64,
    ) -> Result<Self> {
        let path = path.as_ref();
        if keys.len() != index_type.arity() || keys.is_empty() {
            return Err(SegyError::InvalidInput(format!(
                "{index_type} index needs {} keys, got {}",
                index_type.arity(),
                keys.len()
            )));
        }
        let keys: Vec<KeyStats> = keys
            .iter()
            .map(|k| KeyStats { stride: k.effective_stride() as i32, ..*k })
            .collect();
        let slots = slot_count(&keys).unwrap_or(u64::MAX);
        if slots > max_slots {
            return Err(SegyError::IndexTooLarge { slots, limit: max_slots });
        }

        let hdr = data_start(keys.len());
        let total = hdr as u64 + slots * INDEX_SLOT_SIZE as u64;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new().prefix(".ndx_").tempfile_in(dir)?;

        let mut head = Vec::with_capacity(hdr);
        write_i32(&mut head, INDEX_VERSION)?;
        write_i32(&mut head, index_type.code())?;
        write_i32(&mut head, 0)?;
        write_i32(&mut head, keys.len() as i32)?;
        for k in &keys {
            write_i32(&mut head, k.byte_loc)?;
            write_i32(&mut head, k.min)?;
            write_i32(&mut head, k.max)?;
            write_i32(&mut head, k.stride)?;
        }
        tmp.as_file_mut().write_all(&head)?;
        tmp.as_file().set_len(total)?;

        let pitch = pitches(&keys);
        let mut placed = 0u64;
        {
            // SAFETY: the temp file is private to this call until persisted
            let mut map = unsafe { MmapMut::map_mut(tmp.as_file())? };
            for (key, offset) in entries {
                let Some(slot) = slot_of(&keys, &pitch, key) else {
                    tracing::warn!(%key, "key off the index grid; trace dropped");
                    continue;
                };
                if *offset == 0 || *offset > i64::MAX as u64 {
                    tracing::warn!(%key, offset, "invalid trace offset; trace dropped");
                    continue;
                }
                let pos = hdr + slot as usize * INDEX_SLOT_SIZE;
                if read_slot(&map, pos) != ABSENT_OFFSET {
                    tracing::warn!(%key, offset, "duplicate key; keeping the first trace");
                    continue;
                }
                map[pos..pos + INDEX_SLOT_SIZE].copy_from_slice(&(*offset as i64).to_be_bytes());
                placed += 1;
            }
            let n = i32::try_from(placed).unwrap_or(i32::MAX);
            map[NUM_TRACES_POS..NUM_TRACES_POS + 4].copy_from_slice(&n.to_be_bytes());
            map.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        fsync_dir(path)?;
        tracing::info!(path = %path.display(), %index_type, slots, traces = placed, "index written");

        Self::open(path, index_type)
    }

    /// Maps an existing index. Any mismatch with `expected` or a malformed
    /// layout is a `Format` error.
    pub fn open(path: impl AsRef<Path>, expected: IndexType) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        if len < INDEX_FIXED_HDR as u64 {
            return Err(SegyError::Format(format!("{} bytes is too short", len)));
        }
        // SAFETY: the store owns the index file for the session
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let mut cur = Cursor::new(&mmap[..]);
        let version = read_i32(&mut cur)?;
        if version != INDEX_VERSION {
            return Err(SegyError::Format(format!("version {version}, expected {INDEX_VERSION}")));
        }
        let index_type = IndexType::from_code(read_i32(&mut cur)?)?;
        if index_type != expected {
            return Err(SegyError::Format(format!("index type {index_type}, expected {expected}")));
        }
        let num_traces = read_i32(&mut cur)?;
        let num_keys = read_i32(&mut cur)?;
        if num_keys < 0 || num_keys as usize != expected.arity() {
            return Err(SegyError::Format(format!(
                "{num_keys} keys, {expected} needs {}",
                expected.arity()
            )));
        }
        let hdr = data_start(num_keys as usize);
        if len < hdr as u64 {
            return Err(SegyError::Format("truncated key table".into()));
        }
        let mut keys = Vec::with_capacity(num_keys as usize);
        for _ in 0..num_keys {
            let k = KeyStats {
                byte_loc: read_i32(&mut cur)?,
                min: read_i32(&mut cur)?,
                max: read_i32(&mut cur)?,
                stride: read_i32(&mut cur)?,
                count: 0,
            };
            if k.stride <= 0 || k.min > k.max || (k.max as i64 - k.min as i64) % k.stride as i64 != 0 {
                return Err(SegyError::Format(format!(
                    "bad key range {}..={} stride {}",
                    k.min, k.max, k.stride
                )));
            }
            keys.push(k);
        }
        let slots = slot_count(&keys).ok_or_else(|| SegyError::Format("slot count overflows".into()))?;
        let expected_len = slots
            .checked_mul(INDEX_SLOT_SIZE as u64)
            .and_then(|b| b.checked_add(hdr as u64));
        if expected_len != Some(len) {
            return Err(SegyError::Format(format!(
                "length {len} does not match {slots} slots"
            )));
        }

        let pitch = pitches(&keys);
        tracing::debug!(path = %path.display(), %index_type, slots, num_traces, "index opened");
        Ok(Self {
            path,
            file,
            mmap,
            index_type,
            keys,
            pitch,
            slots,
            num_traces: num_traces.max(0) as u64,
        })
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn index_type(&self) -> IndexType { self.index_type }
    pub fn keys(&self) -> &[KeyStats] { &self.keys }
    pub fn slot_count(&self) -> u64 { self.slots }
    pub fn num_traces(&self) -> u64 { self.num_traces }

    /// Slot of `key`, or None when any component is outside [min,max] or
    /// off the stride.
    pub fn slot(&self, key: &TraceKey) -> Option<u64> { slot_of(&self.keys, &self.pitch, key) }

    pub fn contains_key(&self, key: &TraceKey) -> bool { self.slot(key).is_some() }

    /// Byte offset of the trace at `key`.
    pub fn lookup(&self, key: &TraceKey) -> Option<u64> {
        let slot = self.slot(key)?;
        let off = read_slot(&self.mmap, self.slot_pos(slot));
        if off > ABSENT_OFFSET { Some(off as u64) } else { None }
    }

    pub fn store(&mut self, key: &TraceKey, offset: u64) -> Result<()> {
        let slot = self
            .slot(key)
            .ok_or_else(|| SegyError::Range(format!("key {key} outside the index grid")))?;
        if offset == 0 || offset > i64::MAX as u64 {
            return Err(SegyError::InvalidInput(format!("trace offset {offset}")));
        }
        let pos = self.slot_pos(slot);
        if read_slot(&self.mmap, pos) == ABSENT_OFFSET {
            self.num_traces += 1;
            let n = i32::try_from(self.num_traces).unwrap_or(i32::MAX);
            self.mmap[NUM_TRACES_POS..NUM_TRACES_POS + 4].copy_from_slice(&n.to_be_bytes());
        }
        self.mmap[pos..pos + INDEX_SLOT_SIZE].copy_from_slice(&(offset as i64).to_be_bytes());
        Ok(())
    }

    /// Key stored at a slot.
    pub fn key_at(&self, slot: u64) -> Option<TraceKey> {
        if slot >= self.slots {
            return None;
        }
        let mut vals = [0i32; MAX_KEYS];
        let mut rest = slot;
        for (i, k) in self.keys.iter().enumerate() {
            vals[i] = k.value_at(rest / self.pitch[i]);
            rest %= self.pitch[i];
        }
        TraceKey::from_slice(&vals[..self.keys.len()]).ok()
    }

    /// Every (key, offset) pair present, in slot order.
    pub fn entries(&self) -> impl Iterator<Item = (TraceKey, u64)> + '_ {
        (0..self.slots).filter_map(move |slot| {
            let off = read_slot(&self.mmap, self.slot_pos(slot));
            if off > ABSENT_OFFSET {
                self.key_at(slot).map(|k| (k, off as u64))
            } else {
                None
            }
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Marks the index as fresh relative to the data file.
    pub fn touch(&self) -> Result<()> {
        self.file.set_modified(SystemTime::now())?;
        Ok(())
    }

    pub fn modified(path: &Path) -> Result<SystemTime> { Ok(fs::metadata(path)?.modified()?) }

    /// Removes an index file; absent is fine.
    pub fn delete(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// True when the index is older than the data file.
    pub fn is_stale(index_path: &Path, data_path: &Path) -> Result<bool> {
        Ok(Self::modified(index_path)? < Self::modified(data_path)?)
    }

    #[inline]
    fn slot_pos(&self, slot: u64) -> usize { data_start(self.keys.len()) + slot as usize * INDEX_SLOT_SIZE }
}

fn pitches(keys: &[KeyStats]) -> [u64; MAX_KEYS] {
    let mut pitch = [1u64; MAX_KEYS];
    for i in (0..keys.len()).rev() {
        if i + 1 < keys.len() {
            pitch[i] = pitch[i + 1] * keys[i + 1].size();
        }
    }
    pitch
}

#[inline]
fn slot_of(keys: &[KeyStats], pitch: &[u64; MAX_KEYS], key: &TraceKey) -> Option<u64> {
    if key.arity() != keys.len() {
        return None;
    }
    let mut slot = 0u64;
    for (i, (k, v)) in keys.iter().zip(key.as_slice()).enumerate() {
        slot += k.position(*v)? * pitch[i];
    }
    Some(slot)
}

#[inline]
fn read_slot(map: &[u8], pos: usize) -> i64 {
    let mut b = [0u8; INDEX_SLOT_SIZE];
    b.copy_from_slice(&map[pos..pos + INDEX_SLOT_SIZE]);
    i64::from_be_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyRange;
    use tempfile::tempdir;

    fn grid_keys() -> Vec<KeyStats> {
        vec![
            KeyStats::from_range(189, KeyRange::new(100, 102, 1)).unwrap(),
            KeyStats::from_range(193, KeyRange::new(200, 204, 2)).unwrap(),
        ]
    }

    #[test]
    fn create_open_lookup() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("v.sgy.ndx");
        let entries = vec![
            (TraceKey::inline_xline(100, 200), 3600),
            (TraceKey::inline_xline(102, 204), 9000),
            (TraceKey::inline_xline(102, 204), 12000),
        ];
        let ix = TraceIndex::create(&p, IndexType::PostStack3d, &grid_keys(), &entries, 1 << 20).unwrap();
        assert_eq!(ix.slot_count(), 9);
        assert_eq!(ix.num_traces(), 2);
        assert_eq!(ix.lookup(&TraceKey::inline_xline(100, 200)), Some(3600));
        // duplicate keeps the first offset
        assert_eq!(ix.lookup(&TraceKey::inline_xline(102, 204)), Some(9000));
        assert_eq!(ix.lookup(&TraceKey::inline_xline(101, 202)), None);
        // outside the grid and off the stride
        assert_eq!(ix.lookup(&TraceKey::inline_xline(99, 200)), None);
        assert_eq!(ix.lookup(&TraceKey::inline_xline(100, 201)), None);
        assert_eq!(ix.lookup(&TraceKey::cdp(100)), None);
        drop(ix);

        let len = fs::metadata(&p).unwrap().len();
        assert_eq!(len, (16 + 2 * 16 + 9 * 8) as u64);
        let bytes = fs::read(&p).unwrap();
        assert_eq!(&bytes[0..4], &101i32.to_be_bytes());
        assert_eq!(&bytes[4..8], &2i32.to_be_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_be_bytes());

        let ix = TraceIndex::open(&p, IndexType::PostStack3d).unwrap();
        let all: Vec<_> = ix.entries().collect();
        assert_eq!(all, vec![(TraceKey::inline_xline(100, 200), 3600), (TraceKey::inline_xline(102, 204), 9000)]);
        assert_eq!(ix.key_at(4), Some(TraceKey::inline_xline(101, 202)));
    }

    #[test]
    fn store_updates_count_and_rejects_off_grid() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("v.ndx");
        let mut ix = TraceIndex::create(&p, IndexType::PostStack3d, &grid_keys(), &[], 1 << 20).unwrap();
        let k = TraceKey::inline_xline(101, 202);
        ix.store(&k, 4000).unwrap();
        ix.store(&k, 5000).unwrap();
        assert_eq!(ix.num_traces(), 1);
        assert_eq!(ix.lookup(&k), Some(5000));
        assert!(matches!(ix.store(&TraceKey::inline_xline(103, 200), 1), Err(SegyError::Range(_))));
        assert!(matches!(ix.store(&TraceKey::inline_xline(100, 203), 1), Err(SegyError::Range(_))));
        ix.flush().unwrap();
        drop(ix);

        let ix = TraceIndex::open(&p, IndexType::PostStack3d).unwrap();
        assert_eq!(ix.num_traces(), 1);
        assert_eq!(ix.lookup(&k), Some(5000));
    }

    #[test]
    fn open_rejects_mismatches() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("v.ndx");
        TraceIndex::create(&p, IndexType::PostStack3d, &grid_keys(), &[], 1 << 20).unwrap();

        let err = TraceIndex::open(&p, IndexType::PreStack3d).unwrap_err();
        assert!(err.needs_rebuild());

        let mut bytes = fs::read(&p).unwrap();
        bytes[3] = 100;
        fs::write(&p, &bytes).unwrap();
        assert!(matches!(TraceIndex::open(&p, IndexType::PostStack3d), Err(SegyError::Format(_))));

        bytes[3] = 101;
        bytes.truncate(bytes.len() - 8);
        fs::write(&p, &bytes).unwrap();
        assert!(matches!(TraceIndex::open(&p, IndexType::PostStack3d), Err(SegyError::Format(_))));

        fs::write(&p, b"xx").unwrap();
        assert!(matches!(TraceIndex::open(&p, IndexType::PostStack3d), Err(SegyError::Format(_))));
    }

    #[test]
    fn slot_cap_is_enforced() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("v.ndx");
        let err = TraceIndex::create(&p, IndexType::PostStack3d, &grid_keys(), &[], 8).unwrap_err();
        assert!(matches!(err, SegyError::IndexTooLarge { slots: 9, limit: 8 }));
        assert!(!p.exists());
    }

    #[test]
    fn zero_stride_is_stored_as_one() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("v.ndx");
        let mut k = KeyStats::new(21);
        k.observe(500);
        let ix = TraceIndex::create(&p, IndexType::PostStack2d, &[k], &[(TraceKey::cdp(500), 3600)], 16).unwrap();
        assert_eq!(ix.keys()[0].stride, 1);
        assert_eq!(ix.lookup(&TraceKey::cdp(500)), Some(3600));
        assert_eq!(ix.lookup(&TraceKey::cdp(501)), None);
    }

    #[test]
    fn delete_tolerates_absent_file() {
        let dir = tempdir().unwrap();
        TraceIndex::delete(&dir.path().join("none.ndx")).unwrap();
    }
}
