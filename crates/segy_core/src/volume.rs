//! Volume-wide metadata resolved from the file headers.

use crate::config::{VolumeConfig, ZDomain};
use crate::consts::{EXTENDED_HEADER_SIZE, FILE_HEADER_SIZE, TEXT_HEADER_SIZE, TRACE_HEADER_SIZE};
use crate::errors::{Result, SegyError};
use crate::header::{names, FieldValues, HeaderBuffer, BINARY_HEADER, POSTSTACK_3D};
use crate::samples::{ByteOrder, SampleFormat};
use crate::text::TextHeader;
use serde::{Deserialize, Serialize};

// standard trace-header positions, independent of the configured catalog
const TRACE_DELAY_OFFSET: usize = 108;
const TRACE_NUM_SAMPLES_OFFSET: usize = 114;
const TRACE_SAMPLE_INTERVAL_OFFSET: usize = 116;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasurementSystem {
    Meters,
    Feet,
    #[default]
    Unknown,
}

impl MeasurementSystem {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => MeasurementSystem::Meters,
            2 => MeasurementSystem::Feet,
            _ => MeasurementSystem::Unknown,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            MeasurementSystem::Meters => 1,
            MeasurementSystem::Feet => 2,
            MeasurementSystem::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub text_header: TextHeader,
    pub binary: FieldValues,
    pub sample_format: SampleFormat,
    pub byte_order: ByteOrder,
    pub samples_per_trace: usize,
    pub z_start: f32,
    pub z_delta: f32,
    pub z_domain: ZDomain,
    pub measurement: MeasurementSystem,
    pub num_extended_headers: usize,
    pub data_offset: u64,
    pub file_len: u64,
    pub estimated_traces: u64,
}

/// Start of the first trace, after the text, binary and extended headers.
pub fn data_offset(binary: &[u8]) -> Result<u64> {
    let field = BINARY_HEADER
        .get(names::NUM_EXTENDED_HEADERS)
        .ok_or_else(|| SegyError::InvalidInput("binary catalog lacks NUM_EXTENDED_HEADERS".into()))?;
    let num_ext = HeaderBuffer::from_bytes(&BINARY_HEADER, binary)?.read_field(field)?.as_i32();
    if num_ext < 0 {
        return Err(SegyError::UnsupportedFormat(format!(
            "variable number of extended text headers ({num_ext})"
        )));
    }
    Ok(FILE_HEADER_SIZE + num_ext as u64 * EXTENDED_HEADER_SIZE as u64)
}

/// Header values of a 16-bit field read as unsigned.
fn u16_field(values: &FieldValues, name: &str) -> Option<usize> {
    values.get_i32(name).map(|v| v as u16 as usize).filter(|v| *v > 0)
}

impl VolumeInfo {
    /// `first_trace` is the first trace header, when the file has one.
    pub fn from_headers(
        text: &[u8],
        binary: &[u8],
        first_trace: Option<&[u8]>,
        file_len: u64,
        config: &VolumeConfig,
    ) -> Result<Self> {
        let text_header = TextHeader::from_bytes(text)?;
        let values = HeaderBuffer::from_bytes(&BINARY_HEADER, binary)?.sync_from_bytes()?;

        let data_offset = data_offset(binary)?;
        let num_extended_headers = ((data_offset - FILE_HEADER_SIZE) / EXTENDED_HEADER_SIZE as u64) as usize;

        let sample_format = match config.sample_format {
            Some(f) => f,
            None => SampleFormat::from_code(values.get_i32(names::SAMPLE_FORMAT_CODE).unwrap_or(0))?,
        };

        let trace = match first_trace {
            Some(b) => Some(HeaderBuffer::from_bytes(&POSTSTACK_3D, b)?),
            None => None,
        };
        let trace_u16 = |offset: usize| -> Result<Option<usize>> {
            match &trace {
                Some(t) => Ok(Some(t.read_i16(offset)? as u16 as usize).filter(|v| *v > 0)),
                None => Ok(None),
            }
        };

        let samples_per_trace = match u16_field(&values, names::SAMPLES_PER_TRACE) {
            Some(n) => n,
            None => trace_u16(TRACE_NUM_SAMPLES_OFFSET)?.ok_or_else(|| {
                SegyError::InvalidInput("samples per trace missing from binary and trace headers".into())
            })?,
        };

        let z_delta = match config.sample_rate {
            Some(r) => r,
            None => {
                let interval = match u16_field(&values, names::SAMPLE_INTERVAL) {
                    Some(i) => Some(i),
                    None => trace_u16(TRACE_SAMPLE_INTERVAL_OFFSET)?,
                };
                let interval = interval.ok_or_else(|| {
                    SegyError::InvalidInput("sample interval missing; set sample_rate".into())
                })?;
                interval as f32 / 1000.0
            }
        };

        let z_start = match &trace {
            Some(t) => t.read_i16(TRACE_DELAY_OFFSET)? as f32,
            None => 0.0,
        };

        let record = TRACE_HEADER_SIZE as u64 + (samples_per_trace * sample_format.byte_width()) as u64;
        let estimated_traces = file_len.saturating_sub(data_offset) / record;

        Ok(Self {
            text_header,
            measurement: MeasurementSystem::from_code(values.get_i32(names::MEASUREMENT_SYSTEM).unwrap_or(0)),
            binary: values,
            sample_format,
            byte_order: config.byte_order,
            samples_per_trace,
            z_start,
            z_delta,
            z_domain: config.z_domain,
            num_extended_headers,
            data_offset,
            file_len,
            estimated_traces,
        })
    }

    /// Metadata for a volume about to be written.
    pub fn from_layout(layout: &VolumeLayout, config: &VolumeConfig) -> Result<Self> {
        let (text, binary) = layout.header_bytes()?;
        let mut info = Self::from_headers(&text, &binary, None, FILE_HEADER_SIZE, config)?;
        info.sample_format = layout.sample_format;
        info.z_start = layout.z_start;
        info.z_delta = layout.z_delta;
        Ok(info)
    }

    #[inline]
    pub fn trace_bytes(&self) -> usize { self.samples_per_trace * self.sample_format.byte_width() }

    #[inline]
    pub fn record_len(&self) -> u64 { (TRACE_HEADER_SIZE + self.trace_bytes()) as u64 }

    pub fn z_end(&self) -> f32 {
        self.z_start + self.samples_per_trace.saturating_sub(1) as f32 * self.z_delta
    }

    /// Nearest sample index of `z`; not range checked.
    pub fn sample_index(&self, z: f32) -> i64 {
        ((z - self.z_start) / self.z_delta).round() as i64
    }

    /// Sample index range `[i0, i1]` of a window inside the stored one.
    pub fn window(&self, z_start: f32, z_end: f32) -> Result<(usize, usize)> {
        let (i0, i1) = (self.sample_index(z_start), self.sample_index(z_end));
        let last = self.samples_per_trace as i64 - 1;
        if !(z_start.is_finite() && z_end.is_finite()) || i0 < 0 || i1 > last || i0 > i1 {
            return Err(SegyError::Range(format!(
                "z window [{z_start}, {z_end}] outside stored [{}, {}]",
                self.z_start,
                self.z_end()
            )));
        }
        Ok((i0 as usize, i1 as usize))
    }
}

/// Shape of a volume to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeLayout {
    pub sample_format: SampleFormat,
    pub samples_per_trace: usize,
    pub z_start: f32,
    pub z_delta: f32,
    pub measurement: MeasurementSystem,
    pub text: String,
}

impl VolumeLayout {
    /// Text and binary header blocks.
    pub fn header_bytes(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        if self.samples_per_trace == 0 || self.samples_per_trace > u16::MAX as usize {
            return Err(SegyError::InvalidInput(format!(
                "samples per trace {} outside 1..={}",
                self.samples_per_trace,
                u16::MAX
            )));
        }
        let interval = (self.z_delta * 1000.0).round();
        if !(interval >= 1.0 && interval <= u16::MAX as f32) {
            return Err(SegyError::InvalidInput(format!("z delta {} not representable", self.z_delta)));
        }
        let mut values = FieldValues::new();
        values.set_i16(names::SAMPLE_INTERVAL, interval as u16 as i16);
        values.set_i16(names::SAMPLES_PER_TRACE, self.samples_per_trace as u16 as i16);
        values.set_i16(names::SAMPLE_FORMAT_CODE, self.sample_format.code());
        values.set_i16(names::MEASUREMENT_SYSTEM, self.measurement.code());
        values.set_i16(names::SEGY_REVISION, 0x0100);
        values.set_i16(names::FIXED_TRACE_LENGTH, 1);
        values.set_i16(names::NUM_EXTENDED_HEADERS, 0);
        let mut binary = HeaderBuffer::new(&BINARY_HEADER);
        binary.sync_to_bytes(&values)?;

        let text = TextHeader::from_text(&self.text);
        debug_assert_eq!(text.as_bytes().len(), TEXT_HEADER_SIZE);
        Ok((text.as_bytes().to_vec(), binary.into_bytes()))
    }
}
