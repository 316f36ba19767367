//! Header field catalogs and the byte-buffer <-> field-map codec.
//!
//! A catalog is a plain table of `(name, format, offset)` triples for one of
//! the fixed-size headers (400-byte binary header, 240-byte trace header).
//! SEG-Y headers are always big-endian on disk.
//!
//! `HeaderBuffer::sync_from_bytes` / `sync_to_bytes` are the only places where
//! field values and bytes are reconciled. Bytes not covered by a catalog field
//! are never touched.

use crate::consts::{BINARY_HEADER_SIZE, TRACE_HEADER_SIZE};
use crate::errors::{Result, SegyError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldFormat {
    I16,
    I32,
    F32,
    F64,
}

impl FieldFormat {
    pub const fn width(self) -> usize {
        match self {
            FieldFormat::I16 => 2,
            FieldFormat::I32 | FieldFormat::F32 => 4,
            FieldFormat::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderField {
    pub name: &'static str,
    pub format: FieldFormat,
    /// 0-based offset within the header.
    pub offset: usize,
}

impl HeaderField {
    pub const fn new(name: &'static str, format: FieldFormat, offset: usize) -> Self {
        Self { name, format, offset }
    }

    #[inline]
    pub const fn end(&self) -> usize { self.offset + self.format.width() }

    #[inline]
    fn overlaps(&self, offset: usize, width: usize) -> bool {
        self.offset < offset + width && offset < self.end()
    }
}

/// Field names shared by the catalogs and the key extractors.
pub mod names {
    pub const CDP: &str = "CDP";
    pub const OFFSET: &str = "OFFSET";
    pub const INLINE: &str = "INLINE";
    pub const XLINE: &str = "XLINE";
    pub const X: &str = "X";
    pub const Y: &str = "Y";
    pub const COORDINATE_SCALAR: &str = "COORDINATE_SCALAR";
    pub const DELAY_RECORDING_TIME: &str = "DELAY_RECORDING_TIME";
    pub const NUM_SAMPLES: &str = "NUM_SAMPLES";
    pub const SAMPLE_INTERVAL: &str = "SAMPLE_INTERVAL";

    // binary header
    pub const JOB_ID: &str = "JOB_ID";
    pub const LINE_NUM: &str = "LINE_NUM";
    pub const REEL_NUM: &str = "REEL_NUM";
    pub const SAMPLES_PER_TRACE: &str = "SAMPLES_PER_TRACE";
    pub const SAMPLE_FORMAT_CODE: &str = "SAMPLE_FORMAT_CODE";
    pub const MEASUREMENT_SYSTEM: &str = "MEASUREMENT_SYSTEM";
    pub const SEGY_REVISION: &str = "SEGY_REVISION";
    pub const FIXED_TRACE_LENGTH: &str = "FIXED_TRACE_LENGTH";
    pub const NUM_EXTENDED_HEADERS: &str = "NUM_EXTENDED_HEADERS";
}

/// An immutable field table for one header type.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCatalog {
    name: &'static str,
    size: usize,
    fields: Cow<'static, [HeaderField]>,
}

impl HeaderCatalog {
    pub const fn from_static(name: &'static str, size: usize, fields: &'static [HeaderField]) -> Self {
        Self { name, size, fields: Cow::Borrowed(fields) }
    }

    /// Builds a catalog from owned fields, checking the layout invariants.
    pub fn new(name: &'static str, size: usize, mut fields: Vec<HeaderField>) -> Result<Self> {
        fields.sort_by_key(|f| f.offset);
        let cat = Self { name, size, fields: Cow::Owned(fields) };
        cat.validate()?;
        Ok(cat)
    }

    pub fn name(&self) -> &'static str { self.name }
    pub fn size(&self) -> usize { self.size }
    pub fn fields(&self) -> &[HeaderField] { &self.fields }

    pub fn get(&self, name: &str) -> Option<&HeaderField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields must fit inside the header and must not overlap each other.
    pub fn validate(&self) -> Result<()> {
        let mut sorted: Vec<&HeaderField> = self.fields.iter().collect();
        sorted.sort_by_key(|f| f.offset);
        for f in &sorted {
            if f.end() > self.size {
                return Err(SegyError::Range(format!(
                    "{} field {} ends at byte {} beyond header size {}",
                    self.name, f.name, f.end(), self.size
                )));
            }
        }
        for w in sorted.windows(2) {
            if w[0].end() > w[1].offset {
                return Err(SegyError::InvalidInput(format!(
                    "{} fields {} and {} overlap",
                    self.name, w[0].name, w[1].name
                )));
            }
        }
        Ok(())
    }

    /// Moves fields to new 0-based offsets. Fields left under a new position
    /// are dropped from the returned catalog; moved fields must not collide.
    pub fn relocate(&self, moves: &[(&str, usize)]) -> Result<Self> {
        let mut moved: Vec<HeaderField> = Vec::with_capacity(moves.len());
        for (name, offset) in moves {
            let field = *self
                .get(name)
                .ok_or_else(|| SegyError::InvalidInput(format!("{} has no field {name}", self.name)))?;
            moved.push(HeaderField { offset: *offset, ..field });
        }
        let mut fields: Vec<HeaderField> = Vec::with_capacity(self.fields.len());
        for f in self.fields.iter() {
            if moved.iter().any(|m| m.name == f.name) {
                continue;
            }
            if let Some(m) = moved.iter().find(|m| f.overlaps(m.offset, m.format.width())) {
                tracing::debug!(catalog = self.name, moved = m.name, dropped = f.name, "relocated field shadows another");
                continue;
            }
            fields.push(*f);
        }
        fields.extend(moved);
        Self::new(self.name, self.size, fields)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    I16(i16),
    I32(i32),
    F32(f32),
    F64(f64),
}

impl FieldValue {
    pub fn as_i32(self) -> i32 {
        match self {
            FieldValue::I16(v) => v as i32,
            FieldValue::I32(v) => v,
            FieldValue::F32(v) => v.round() as i32,
            FieldValue::F64(v) => v.round() as i32,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            FieldValue::I16(v) => v as f64,
            FieldValue::I32(v) => v as f64,
            FieldValue::F32(v) => v as f64,
            FieldValue::F64(v) => v,
        }
    }

    fn coerce(self, format: FieldFormat) -> FieldValue {
        match format {
            FieldFormat::I16 => FieldValue::I16(self.as_i32() as i16),
            FieldFormat::I32 => FieldValue::I32(self.as_i32()),
            FieldFormat::F32 => FieldValue::F32(self.as_f64() as f32),
            FieldFormat::F64 => FieldValue::F64(self.as_f64()),
        }
    }
}

/// Named header values, detached from any byte buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldValues(BTreeMap<&'static str, FieldValue>);

impl FieldValues {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, name: &str) -> Option<FieldValue> { self.0.get(name).copied() }
    pub fn get_i32(&self, name: &str) -> Option<i32> { self.get(name).map(FieldValue::as_i32) }
    pub fn set(&mut self, name: &'static str, v: FieldValue) { self.0.insert(name, v); }
    pub fn set_i32(&mut self, name: &'static str, v: i32) { self.set(name, FieldValue::I32(v)); }
    pub fn set_i16(&mut self, name: &'static str, v: i16) { self.set(name, FieldValue::I16(v)); }
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> { self.0.remove(name) }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, FieldValue)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

/// A fixed-size header block bound to its catalog.
#[derive(Debug, Clone)]
pub struct HeaderBuffer<'c> {
    catalog: &'c HeaderCatalog,
    bytes: Vec<u8>,
}

impl<'c> HeaderBuffer<'c> {
    pub fn new(catalog: &'c HeaderCatalog) -> Self {
        Self { catalog, bytes: vec![0u8; catalog.size()] }
    }

    pub fn from_bytes(catalog: &'c HeaderCatalog, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != catalog.size() {
            return Err(SegyError::Range(format!(
                "{} header needs {} bytes, got {}",
                catalog.name(), catalog.size(), bytes.len()
            )));
        }
        Ok(Self { catalog, bytes: bytes.to_vec() })
    }

    pub fn catalog(&self) -> &HeaderCatalog { self.catalog }
    pub fn bytes(&self) -> &[u8] { &self.bytes }
    pub fn bytes_mut(&mut self) -> &mut [u8] { &mut self.bytes }
    pub fn into_bytes(self) -> Vec<u8> { self.bytes }

    /// Decodes every catalog field from the buffer.
    pub fn sync_from_bytes(&self) -> Result<FieldValues> {
        let mut out = FieldValues::new();
        for f in self.catalog.fields() {
            out.set(f.name, self.read_field(f)?);
        }
        Ok(out)
    }

    /// Encodes every catalog field present in `values`; everything else is left as is.
    pub fn sync_to_bytes(&mut self, values: &FieldValues) -> Result<()> {
        let catalog = self.catalog;
        for f in catalog.fields() {
            if let Some(v) = values.get(f.name) {
                self.write_field(f, v)?;
            }
        }
        Ok(())
    }

    pub fn read_field(&self, f: &HeaderField) -> Result<FieldValue> {
        Ok(match f.format {
            FieldFormat::I16 => FieldValue::I16(self.read_i16(f.offset)?),
            FieldFormat::I32 => FieldValue::I32(self.read_i32(f.offset)?),
            FieldFormat::F32 => FieldValue::F32(f32::from_bits(self.read_i32(f.offset)? as u32)),
            FieldFormat::F64 => FieldValue::F64(f64::from_be_bytes(self.slice::<8>(f.offset)?)),
        })
    }

    pub fn write_field(&mut self, f: &HeaderField, v: FieldValue) -> Result<()> {
        match v.coerce(f.format) {
            FieldValue::I16(x) => self.write_i16(f.offset, x),
            FieldValue::I32(x) => self.write_i32(f.offset, x),
            FieldValue::F32(x) => self.put(f.offset, x.to_be_bytes()),
            FieldValue::F64(x) => self.put(f.offset, x.to_be_bytes()),
        }
    }

    pub fn read_i16(&self, offset: usize) -> Result<i16> {
        Ok(i16::from_be_bytes(self.slice::<2>(offset)?))
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32> {
        Ok(i32::from_be_bytes(self.slice::<4>(offset)?))
    }

    pub fn write_i16(&mut self, offset: usize, v: i16) -> Result<()> { self.put(offset, v.to_be_bytes()) }
    pub fn write_i32(&mut self, offset: usize, v: i32) -> Result<()> { self.put(offset, v.to_be_bytes()) }

    fn check(&self, offset: usize, width: usize) -> Result<()> {
        if offset.checked_add(width).map_or(true, |end| end > self.bytes.len()) {
            return Err(SegyError::Range(format!(
                "byte offset {offset} (+{width}) outside {} header of {} bytes",
                self.catalog.name(), self.bytes.len()
            )));
        }
        Ok(())
    }

    fn slice<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        self.check(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[offset..offset + N]);
        Ok(out)
    }

    fn put<const N: usize>(&mut self, offset: usize, b: [u8; N]) -> Result<()> {
        self.check(offset, N)?;
        self.bytes[offset..offset + N].copy_from_slice(&b);
        Ok(())
    }
}

use FieldFormat::{I16, I32};

pub const BINARY_FIELDS: &[HeaderField] = &[
    HeaderField::new(names::JOB_ID, I32, 0),
    HeaderField::new(names::LINE_NUM, I32, 4),
    HeaderField::new(names::REEL_NUM, I32, 8),
    HeaderField::new("TRACES_PER_RECORD", I16, 12),
    HeaderField::new("AUX_TRACES_PER_RECORD", I16, 14),
    HeaderField::new(names::SAMPLE_INTERVAL, I16, 16),
    HeaderField::new("SAMPLE_INTERVAL_ORIG", I16, 18),
    HeaderField::new(names::SAMPLES_PER_TRACE, I16, 20),
    HeaderField::new("SAMPLES_PER_TRACE_ORIG", I16, 22),
    HeaderField::new(names::SAMPLE_FORMAT_CODE, I16, 24),
    HeaderField::new("CDP_FOLD", I16, 26),
    HeaderField::new("TRACE_SORTING_CODE", I16, 28),
    HeaderField::new("VERTICAL_SUM_CODE", I16, 30),
    HeaderField::new("SWEEP_FREQ_START", I16, 32),
    HeaderField::new("SWEEP_FREQ_END", I16, 34),
    HeaderField::new("SWEEP_LENGTH", I16, 36),
    HeaderField::new("SWEEP_TYPE_CODE", I16, 38),
    HeaderField::new("TRACE_NUM_OF_SWEEP_CHANNEL", I16, 40),
    HeaderField::new("TAPER_LENGTH_START", I16, 42),
    HeaderField::new("TAPER_LENGTH_END", I16, 44),
    HeaderField::new("TAPER_TYPE", I16, 46),
    HeaderField::new("CORR_DATA_TRACES", I16, 48),
    HeaderField::new("BINARY_GAIN_RECOVERED", I16, 50),
    HeaderField::new("AMPL_RECOVERY_METHOD", I16, 52),
    HeaderField::new(names::MEASUREMENT_SYSTEM, I16, 54),
    HeaderField::new("IMPULSE_SIGNAL_POLARITY", I16, 56),
    HeaderField::new("VIBRATORY_POLARITY_CODE", I16, 58),
    HeaderField::new(names::SEGY_REVISION, I16, 300),
    HeaderField::new(names::FIXED_TRACE_LENGTH, I16, 302),
    HeaderField::new(names::NUM_EXTENDED_HEADERS, I16, 304),
];

macro_rules! trace_fields {
    ($($extra:expr),* $(,)?) => {
        &[
            HeaderField::new("TRACE_SEQ_NUM_IN_LINE", I32, 0),
            HeaderField::new("TRACE_SEQ_NUM_IN_REEL", I32, 4),
            HeaderField::new("FIELD_RECORD_NUM", I32, 8),
            HeaderField::new("TRACE_NUM", I32, 12),
            HeaderField::new("SOURCE_POINT_NUM", I32, 16),
            HeaderField::new("TRACE_NUM_IN_CDP", I32, 24),
            HeaderField::new("TRACE_ID_CODE", I16, 28),
            HeaderField::new("NUM_VERTICAL_TRACES", I16, 30),
            HeaderField::new("NUM_HORIZONTAL_TRACES", I16, 32),
            HeaderField::new("DATA_USE", I16, 34),
            HeaderField::new("RECEIVER_ELEVATION", I32, 40),
            HeaderField::new("SURFACE_ELEVATION_AT_SOURCE", I32, 44),
            HeaderField::new("SOURCE_DEPTH", I32, 48),
            HeaderField::new("DATUM_ELEVATION_AT_RECEIVER", I32, 52),
            HeaderField::new("DATUM_ELEVATION_AT_SOURCE", I32, 56),
            HeaderField::new("WATER_DEPTH_AT_SOURCE", I32, 60),
            HeaderField::new("WATER_DEPTH_AT_GROUP", I32, 64),
            HeaderField::new("ELEVATION_SCALAR", I16, 68),
            HeaderField::new(names::COORDINATE_SCALAR, I16, 70),
            HeaderField::new("SOURCE_COORDINATE_X", I32, 72),
            HeaderField::new("SOURCE_COORDINATE_Y", I32, 76),
            HeaderField::new("GROUP_COORDINATE_X", I32, 80),
            HeaderField::new("GROUP_COORDINATE_Y", I32, 84),
            HeaderField::new("COORDINATE_UNITS", I16, 88),
            HeaderField::new("WEATHERING_VELOCITY", I16, 90),
            HeaderField::new("SUBWEATHERING_VELOCITY", I16, 92),
            HeaderField::new("UPHOLE_TIME_AT_SOURCE", I16, 94),
            HeaderField::new("UPHOLE_TIME_AT_GROUP", I16, 96),
            HeaderField::new("SOURCE_STATIC_CORRECTION", I16, 98),
            HeaderField::new("GROUP_STATIC_CORRECTION", I16, 100),
            HeaderField::new("TOTAL_STATIC_APPLIED", I16, 102),
            HeaderField::new("LAG_TIME_A", I16, 104),
            HeaderField::new("LAG_TIME_B", I16, 106),
            HeaderField::new(names::DELAY_RECORDING_TIME, I16, 108),
            HeaderField::new("MUTE_TIME_START", I16, 110),
            HeaderField::new("MUTE_TIME_END", I16, 112),
            HeaderField::new(names::NUM_SAMPLES, I16, 114),
            HeaderField::new(names::SAMPLE_INTERVAL, I16, 116),
            HeaderField::new("GAIN_TYPE", I16, 118),
            HeaderField::new("INSTRUMENT_GAIN_CONSTANT", I16, 120),
            HeaderField::new("INSTRUMENT_INITIAL_GAIN", I16, 122),
            HeaderField::new("CORRELATED", I16, 124),
            HeaderField::new("SWEEP_FREQ_AT_START", I16, 126),
            HeaderField::new("SWEEP_FREQ_AT_END", I16, 128),
            HeaderField::new("SWEEP_LENGTH", I16, 130),
            HeaderField::new("SWEEP_TYPE", I16, 132),
            HeaderField::new("SWEEP_TAPER_LENGTH_START", I16, 134),
            HeaderField::new("SWEEP_TAPER_LENGTH_END", I16, 136),
            HeaderField::new("TAPER_TYPE", I16, 138),
            HeaderField::new("ALIAS_FILTER_FREQ", I16, 140),
            HeaderField::new("ALIAS_FILTER_SLOPE", I16, 142),
            HeaderField::new("NOTCH_FILTER_FREQ", I16, 144),
            HeaderField::new("NOTCH_FILTER_SLOPE", I16, 146),
            HeaderField::new("LOW_CUT_FREQ", I16, 148),
            HeaderField::new("HIGH_CUT_FREQ", I16, 150),
            HeaderField::new("LOW_CUT_SLOPE", I16, 152),
            HeaderField::new("HIGH_CUT_SLOPE", I16, 154),
            HeaderField::new("YEAR_DATA_RECORDED", I16, 156),
            HeaderField::new("DAY_OF_YEAR", I16, 158),
            HeaderField::new("HOUR_OF_DAY", I16, 160),
            HeaderField::new("MINUTE_OF_HOUR", I16, 162),
            HeaderField::new("SECOND_OF_MINUTE", I16, 164),
            HeaderField::new("TIME_BASIS_CODE", I16, 166),
            HeaderField::new("TRACE_WEIGHTING_FACTOR", I16, 168),
            HeaderField::new("GEOPHONE_GROUP_ROLL", I16, 170),
            HeaderField::new("GEOPHONE_GROUP_FIRST_TRACE", I16, 172),
            HeaderField::new("GEOPHONE_GROUP_LAST_TRACE", I16, 174),
            HeaderField::new("GAP_SIZE", I16, 176),
            HeaderField::new("OVERTRAVEL", I16, 178),
            $($extra),*
        ]
    };
}

const CDP_FIELD: HeaderField = HeaderField::new(names::CDP, I32, 20);
const OFFSET_FIELD: HeaderField = HeaderField::new(names::OFFSET, I32, 36);
const X_FIELD: HeaderField = HeaderField::new(names::X, I32, 180);
const Y_FIELD: HeaderField = HeaderField::new(names::Y, I32, 184);
const INLINE_FIELD: HeaderField = HeaderField::new(names::INLINE, I32, 188);
const XLINE_FIELD: HeaderField = HeaderField::new(names::XLINE, I32, 192);

pub static BINARY_HEADER: HeaderCatalog =
    HeaderCatalog::from_static("binary", BINARY_HEADER_SIZE, BINARY_FIELDS);

const POSTSTACK_2D_FIELDS: &[HeaderField] = trace_fields![CDP_FIELD, X_FIELD, Y_FIELD];
const POSTSTACK_3D_FIELDS: &[HeaderField] = trace_fields![X_FIELD, Y_FIELD, INLINE_FIELD, XLINE_FIELD];
const PRESTACK_3D_FIELDS: &[HeaderField] =
    trace_fields![OFFSET_FIELD, X_FIELD, Y_FIELD, INLINE_FIELD, XLINE_FIELD];

pub static POSTSTACK_2D: HeaderCatalog =
    HeaderCatalog::from_static("PostStack2d", TRACE_HEADER_SIZE, POSTSTACK_2D_FIELDS);
pub static POSTSTACK_3D: HeaderCatalog =
    HeaderCatalog::from_static("PostStack3d", TRACE_HEADER_SIZE, POSTSTACK_3D_FIELDS);
pub static PRESTACK_3D: HeaderCatalog =
    HeaderCatalog::from_static("PreStack3d", TRACE_HEADER_SIZE, PRESTACK_3D_FIELDS);
