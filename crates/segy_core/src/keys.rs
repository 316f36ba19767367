use crate::consts::MAX_KEYS;
use crate::errors::{Result, SegyError};
use crate::header::{names, FieldValues, HeaderCatalog, POSTSTACK_2D, POSTSTACK_3D, PRESTACK_3D};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Volume kinds; the discriminant is the type code stored in the index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    Unknown = 0,
    PostStack2d = 1,
    PostStack3d = 2,
    PreStack3d = 3,
}

impl IndexType {
    pub const fn code(self) -> i32 { self as i32 }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(IndexType::Unknown),
            1 => Ok(IndexType::PostStack2d),
            2 => Ok(IndexType::PostStack3d),
            3 => Ok(IndexType::PreStack3d),
            other => Err(SegyError::Format(format!("unknown index type code {other}"))),
        }
    }

    pub const fn arity(self) -> usize {
        match self {
            IndexType::Unknown => 0,
            IndexType::PostStack2d => 1,
            IndexType::PostStack3d => 2,
            IndexType::PreStack3d => 3,
        }
    }

    /// Trace-header fields forming the key, slowest dimension first.
    pub const fn key_names(self) -> &'static [&'static str] {
        match self {
            IndexType::Unknown => &[],
            IndexType::PostStack2d => &[names::CDP],
            IndexType::PostStack3d => &[names::INLINE, names::XLINE],
            IndexType::PreStack3d => &[names::INLINE, names::XLINE, names::OFFSET],
        }
    }

    pub fn catalog(self) -> Result<&'static HeaderCatalog> {
        match self {
            IndexType::PostStack2d => Ok(&POSTSTACK_2D),
            IndexType::PostStack3d => Ok(&POSTSTACK_3D),
            IndexType::PreStack3d => Ok(&PRESTACK_3D),
            IndexType::Unknown => Err(SegyError::UnsupportedFormat("index type Unknown".into())),
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexType::Unknown => "unknown",
            IndexType::PostStack2d => "poststack-2d",
            IndexType::PostStack3d => "poststack-3d",
            IndexType::PreStack3d => "prestack-3d",
        };
        f.write_str(s)
    }
}

/// 1 to 3 integer survey keys, slowest dimension first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceKey {
    vals: [i32; MAX_KEYS],
    len: u8,
}

impl TraceKey {
    pub const fn cdp(cdp: i32) -> Self { Self { vals: [cdp, 0, 0], len: 1 } }

    pub const fn inline_xline(inline: i32, xline: i32) -> Self {
        Self { vals: [inline, xline, 0], len: 2 }
    }

    pub const fn inline_xline_offset(inline: i32, xline: i32, offset: i32) -> Self {
        Self { vals: [inline, xline, offset], len: 3 }
    }

    pub fn from_slice(vals: &[i32]) -> Result<Self> {
        if vals.is_empty() || vals.len() > MAX_KEYS {
            return Err(SegyError::InvalidInput(format!(
                "a trace key has 1 to {MAX_KEYS} components, got {}",
                vals.len()
            )));
        }
        let mut k = Self { vals: [0; MAX_KEYS], len: vals.len() as u8 };
        k.vals[..vals.len()].copy_from_slice(vals);
        Ok(k)
    }

    #[inline]
    pub fn as_slice(&self) -> &[i32] { &self.vals[..self.len as usize] }

    #[inline]
    pub fn arity(&self) -> usize { self.len as usize }

    /// A zero component marks an unassigned trace header.
    pub fn is_assigned(&self) -> bool { self.as_slice().iter().all(|v| *v != 0) }
}

impl fmt::Display for TraceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.as_slice().iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

impl Serialize for TraceKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_seq(self.as_slice())
    }
}

impl FromStr for TraceKey {
    type Err = SegyError;

    fn from_str(s: &str) -> Result<Self> {
        let vals = s
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SegyError::InvalidInput(format!("bad key {s:?}: {e}")))?;
        Self::from_slice(&vals)
    }
}

/// Per-dimension build statistics. `byte_loc` is the 1-based trace-header
/// location the key is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    pub byte_loc: i32,
    pub min: i32,
    pub max: i32,
    pub stride: i32,
    #[serde(skip)]
    pub count: u64,
}

impl KeyStats {
    pub fn new(byte_loc: i32) -> Self {
        Self { byte_loc, min: 0, max: 0, stride: 0, count: 0 }
    }

    pub fn from_range(byte_loc: i32, r: KeyRange) -> Result<Self> {
        r.check()?;
        // trim the end onto the step grid
        let span = (r.end as i64 - r.start as i64) / r.step as i64 * r.step as i64;
        Ok(Self {
            byte_loc,
            min: r.start,
            max: (r.start as i64 + span) as i32,
            stride: r.step,
            count: 0,
        })
    }

    /// Online stride inference. Not a true GCD: an irregular sequence falls
    /// back to stride 1.
    pub fn observe(&mut self, v: i32) {
        if self.count == 0 {
            self.min = v;
            self.max = v;
            self.stride = 0;
        } else {
            let d = (v as i64 - self.min as i64).unsigned_abs();
            let d = i32::try_from(d).unwrap_or(i32::MAX);
            if self.stride == 0 {
                self.stride = d;
            } else {
                let rem = d % self.stride;
                if rem != 0 {
                    self.stride = if self.stride % rem == 0 { rem } else { 1 };
                }
            }
            if v < self.min {
                self.min = v;
            }
            if v > self.max {
                self.max = v;
            }
        }
        self.count += 1;
    }

    #[inline]
    pub fn effective_stride(&self) -> i64 { if self.stride <= 0 { 1 } else { self.stride as i64 } }

    pub fn size(&self) -> u64 {
        if self.stride <= 0 {
            return 1;
        }
        1 + ((self.max as i64 - self.min as i64) / self.stride as i64) as u64
    }

    /// Grid position of `v`, or None when outside [min,max] or off the stride.
    #[inline]
    pub fn position(&self, v: i32) -> Option<u64> {
        if v < self.min || v > self.max {
            return None;
        }
        let d = v as i64 - self.min as i64;
        let s = self.effective_stride();
        if d % s != 0 {
            return None;
        }
        Some((d / s) as u64)
    }

    pub fn value_at(&self, pos: u64) -> i32 {
        (self.min as i64 + pos as i64 * self.effective_stride()) as i32
    }
}

/// Inclusive key range with a positive step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: i32,
    pub end: i32,
    pub step: i32,
}

impl KeyRange {
    pub const fn new(start: i32, end: i32, step: i32) -> Self { Self { start, end, step } }
    pub const fn single(v: i32) -> Self { Self { start: v, end: v, step: 1 } }

    fn check(&self) -> Result<()> {
        if self.step <= 0 || self.start > self.end {
            return Err(SegyError::InvalidInput(format!(
                "bad key range {}..={} step {}",
                self.start, self.end, self.step
            )));
        }
        Ok(())
    }

    pub fn values(&self) -> impl Iterator<Item = i32> {
        let (start, end, step) = (self.start as i64, self.end as i64, self.step.max(1) as usize);
        (start..=end).step_by(step).map(|v| v as i32)
    }
}

/// Every key of the per-dimension ranges, last dimension varying fastest.
pub fn grid(ranges: &[KeyRange]) -> Result<Vec<TraceKey>> {
    if ranges.is_empty() || ranges.len() > MAX_KEYS {
        return Err(SegyError::InvalidInput(format!("grid needs 1 to {MAX_KEYS} ranges")));
    }
    for r in ranges {
        r.check()?;
    }
    let mut out = vec![Vec::new()];
    for r in ranges {
        let mut next = Vec::new();
        for prefix in &out {
            for v in r.values() {
                let mut p: Vec<i32> = prefix.clone();
                p.push(v);
                next.push(p);
            }
        }
        out = next;
    }
    out.iter().map(|v| TraceKey::from_slice(v)).collect()
}

/// Key extraction strategy applied to decoded trace-header fields.
pub type KeyFn = Arc<dyn Fn(&FieldValues) -> Option<TraceKey> + Send + Sync>;

/// Reads the index type's key fields by name; None when any is missing.
pub fn default_key_fn(index_type: IndexType) -> KeyFn {
    let names = index_type.key_names();
    Arc::new(move |fields: &FieldValues| {
        let mut vals = [0i32; MAX_KEYS];
        for (slot, name) in vals.iter_mut().zip(names) {
            *slot = fields.get_i32(name)?;
        }
        TraceKey::from_slice(&vals[..names.len()]).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(seq: &[i32]) -> KeyStats {
        let mut s = KeyStats::new(189);
        for v in seq {
            s.observe(*v);
        }
        s
    }

    #[test]
    fn regular_sequence_infers_stride() {
        let s = stats(&[100, 102, 104, 106]);
        assert_eq!((s.min, s.max, s.stride), (100, 106, 2));
        assert_eq!(s.size(), 4);
    }

    #[test]
    fn irregular_sequence_falls_back_to_one() {
        let s = stats(&[100, 102, 107]);
        assert_eq!((s.min, s.max, s.stride), (100, 107, 1));
        assert_eq!(s.size(), 8);
    }

    #[test]
    fn stride_refines_to_divisor() {
        let s = stats(&[100, 104, 102]);
        assert_eq!(s.stride, 2);
        let s = stats(&[100, 106, 104]);
        assert_eq!(s.stride, 1);
        let s = stats(&[100, 100, 100]);
        assert_eq!((s.stride, s.size()), (0, 1));
    }

    #[test]
    fn descending_values_widen_min() {
        let s = stats(&[204, 202, 200]);
        assert_eq!((s.min, s.max, s.stride), (200, 204, 2));
        assert_eq!(s.position(202), Some(1));
        assert_eq!(s.position(203), None);
        assert_eq!(s.position(206), None);
        assert_eq!(s.value_at(2), 204);
    }

    #[test]
    fn key_parse_and_display() {
        let k: TraceKey = "100, 200".parse().unwrap();
        assert_eq!(k, TraceKey::inline_xline(100, 200));
        assert_eq!(k.to_string(), "100,200");
        assert!("1,2,3,4".parse::<TraceKey>().is_err());
        assert!("a".parse::<TraceKey>().is_err());
        assert!(!TraceKey::inline_xline(0, 5).is_assigned());
    }

    #[test]
    fn grid_is_last_dimension_fastest() {
        let keys = grid(&[KeyRange::new(1, 2, 1), KeyRange::new(10, 14, 2)]).unwrap();
        let flat: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(flat, ["1,10", "1,12", "1,14", "2,10", "2,12", "2,14"]);
        assert!(grid(&[KeyRange::new(5, 1, 1)]).is_err());
    }

    #[test]
    fn range_stats_trim_to_grid() {
        let s = KeyStats::from_range(1, KeyRange::new(10, 15, 2)).unwrap();
        assert_eq!((s.min, s.max, s.stride, s.size()), (10, 14, 2, 3));
    }

    #[test]
    fn default_extractor_reads_named_fields() {
        let f = default_key_fn(IndexType::PreStack3d);
        let mut vals = FieldValues::new();
        vals.set_i32(names::INLINE, 7);
        vals.set_i32(names::XLINE, 8);
        assert_eq!(f(&vals), None);
        vals.set_i32(names::OFFSET, 9);
        assert_eq!(f(&vals), Some(TraceKey::inline_xline_offset(7, 8, 9)));
    }
}
