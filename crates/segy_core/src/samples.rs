//! Trace sample codecs: IBM float, IEEE float, fixed-point integers.
//!
//! Decoding is lossless for integer formats. Encoding rounds to nearest (half
//! away from zero) and clamps to the target range. IBM values whose exponent
//! overflows IEEE single precision decode to signed infinity.

use crate::errors::{Result, SegyError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    IbmFloat,
    Fixed32,
    Fixed16,
    Fixed32WithGain,
    IeeeFloat,
    Fixed8,
}

impl SampleFormat {
    pub fn from_code(code: i32) -> Result<Self> {
        Ok(match code {
            1 => SampleFormat::IbmFloat,
            2 => SampleFormat::Fixed32,
            3 => SampleFormat::Fixed16,
            4 => SampleFormat::Fixed32WithGain,
            5 => SampleFormat::IeeeFloat,
            8 => SampleFormat::Fixed8,
            other => return Err(SegyError::UnsupportedFormat(format!("sample format code {other}"))),
        })
    }

    pub const fn code(self) -> i16 {
        match self {
            SampleFormat::IbmFloat => 1,
            SampleFormat::Fixed32 => 2,
            SampleFormat::Fixed16 => 3,
            SampleFormat::Fixed32WithGain => 4,
            SampleFormat::IeeeFloat => 5,
            SampleFormat::Fixed8 => 8,
        }
    }

    pub const fn byte_width(self) -> usize {
        match self {
            SampleFormat::Fixed16 => 2,
            SampleFormat::Fixed8 => 1,
            _ => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SampleFormat::IbmFloat => "IBM float",
            SampleFormat::Fixed32 => "32-bit fixed point",
            SampleFormat::Fixed16 => "16-bit fixed point",
            SampleFormat::Fixed32WithGain => "32-bit fixed point with gain",
            SampleFormat::IeeeFloat => "IEEE float",
            SampleFormat::Fixed8 => "8-bit fixed point",
        }
    }
}

/// Byte order of trace samples. Headers are big-endian regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

impl ByteOrder {
    #[inline]
    fn word(self, b: [u8; 4]) -> u32 {
        match self {
            ByteOrder::BigEndian => u32::from_be_bytes(b),
            ByteOrder::LittleEndian => u32::from_le_bytes(b),
        }
    }

    #[inline]
    fn word_bytes(self, w: u32) -> [u8; 4] {
        match self {
            ByteOrder::BigEndian => w.to_be_bytes(),
            ByteOrder::LittleEndian => w.to_le_bytes(),
        }
    }

    #[inline]
    fn half(self, b: [u8; 2]) -> i16 {
        match self {
            ByteOrder::BigEndian => i16::from_be_bytes(b),
            ByteOrder::LittleEndian => i16::from_le_bytes(b),
        }
    }

    #[inline]
    fn half_bytes(self, v: i16) -> [u8; 2] {
        match self {
            ByteOrder::BigEndian => v.to_be_bytes(),
            ByteOrder::LittleEndian => v.to_le_bytes(),
        }
    }
}

/// Converts an IBM System/360 single-precision bit pattern to IEEE.
pub fn ibm_to_ieee(bits: u32) -> f32 {
    let mut mant = bits & 0x00ff_ffff;
    if mant == 0 {
        return 0.0;
    }
    let sign = bits & 0x8000_0000;
    // base-16 exponent rescaled to base 2 with IEEE bias
    let mut exp = (((bits & 0x7f00_0000) >> 22) as i32) - 130;
    while mant & 0x0080_0000 == 0 {
        mant <<= 1;
        exp -= 1;
    }
    if exp > 254 {
        return f32::from_bits(sign | 0x7f80_0000);
    }
    if exp <= 0 {
        return f32::from_bits(sign);
    }
    f32::from_bits(sign | ((exp as u32) << 23) | (mant & 0x007f_ffff))
}

/// Converts an IEEE single to an IBM bit pattern. Precision loss is limited
/// to the low mantissa bits shifted out during base-16 alignment.
pub fn ieee_to_ibm(v: f32) -> u32 {
    let bits = v.to_bits();
    let sign = bits & 0x8000_0000;
    let biased = (bits & 0x7f80_0000) >> 23;
    if biased == 0 {
        // zero and subnormals
        return 0;
    }
    if biased == 0xff {
        // no IBM infinity; saturate
        return sign | 0x7fff_ffff;
    }
    let mut mant = (bits & 0x007f_ffff) | 0x0080_0000;
    let mut exp = biased as i32 - 126;
    while exp & 3 != 0 {
        exp += 1;
        mant >>= 1;
    }
    let ibm_exp = (exp >> 2) + 64;
    if ibm_exp > 127 {
        return sign | 0x7fff_ffff;
    }
    if ibm_exp < 0 {
        return 0;
    }
    sign | ((ibm_exp as u32) << 24) | mant
}

#[inline]
fn round_clamp(v: f32, lo: f64, hi: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    (v as f64).round().clamp(lo, hi)
}

/// Decodes `n` samples (`bytes.len() / width`). Extra trailing bytes are ignored.
pub fn decode(bytes: &[u8], format: SampleFormat, order: ByteOrder) -> Vec<f32> {
    let mut out = Vec::with_capacity(bytes.len() / format.byte_width());
    decode_into(bytes, format, order, &mut out);
    out
}

pub fn decode_into(bytes: &[u8], format: SampleFormat, order: ByteOrder, out: &mut Vec<f32>) {
    out.clear();
    match format {
        SampleFormat::Fixed16 => {
            out.extend(bytes.chunks_exact(2).map(|c| order.half([c[0], c[1]]) as f32));
        }
        SampleFormat::Fixed8 => {
            out.extend(bytes.iter().map(|b| *b as i8 as f32));
        }
        _ => {
            for c in bytes.chunks_exact(4) {
                let raw = [c[0], c[1], c[2], c[3]];
                let w = order.word(raw);
                out.push(match format {
                    SampleFormat::IbmFloat => ibm_to_ieee(w),
                    SampleFormat::IeeeFloat => f32::from_bits(w),
                    SampleFormat::Fixed32 => w as i32 as f32,
                    // byte 0 unused, byte 1 gain exponent, bytes 2..4 mantissa
                    _ => {
                        let (gain, mant) = match order {
                            ByteOrder::BigEndian => (raw[1], i16::from_be_bytes([raw[2], raw[3]])),
                            ByteOrder::LittleEndian => (raw[2], i16::from_le_bytes([raw[0], raw[1]])),
                        };
                        mant as f32 * gain as f32
                    }
                });
            }
        }
    }
}

/// Encodes samples into `format`. Fixed32WithGain has no encoder.
pub fn encode(samples: &[f32], format: SampleFormat, order: ByteOrder) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(samples.len() * format.byte_width());
    match format {
        SampleFormat::IbmFloat => {
            for &s in samples {
                out.extend_from_slice(&order.word_bytes(ieee_to_ibm(s)));
            }
        }
        SampleFormat::IeeeFloat => {
            for &s in samples {
                out.extend_from_slice(&order.word_bytes(s.to_bits()));
            }
        }
        SampleFormat::Fixed32 => {
            for &s in samples {
                let v = round_clamp(s, i32::MIN as f64, i32::MAX as f64) as i32;
                out.extend_from_slice(&order.word_bytes(v as u32));
            }
        }
        SampleFormat::Fixed16 => {
            for &s in samples {
                let v = round_clamp(s, i16::MIN as f64, i16::MAX as f64) as i16;
                out.extend_from_slice(&order.half_bytes(v));
            }
        }
        SampleFormat::Fixed8 => {
            for &s in samples {
                let v = round_clamp(s, i8::MIN as f64, i8::MAX as f64) as i8;
                out.push(v as u8);
            }
        }
        SampleFormat::Fixed32WithGain => {
            return Err(SegyError::UnsupportedFormat(format!("encoding {}", format.name())));
        }
    }
    Ok(out)
}
