// crates/segy_core/src/consts.rs

/// Fixed sizes of the SEG-Y header blocks.
pub const TEXT_HEADER_SIZE: usize = 3200;
pub const BINARY_HEADER_SIZE: usize = 400;
pub const TRACE_HEADER_SIZE: usize = 240;
pub const EXTENDED_HEADER_SIZE: usize = 3200;

/// Byte position of the first trace when no extended headers are present.
pub const FILE_HEADER_SIZE: u64 = (TEXT_HEADER_SIZE + BINARY_HEADER_SIZE) as u64;

pub const INDEX_VERSION: i32 = 101;
pub const INDEX_EXTENSION: &str = "ndx";
pub const INDEX_FIXED_HDR: usize = 16; // version, type, numTraces, numKeys
pub const INDEX_KEY_HDR: usize = 16; // byteLoc, min, max, stride
pub const INDEX_SLOT_SIZE: usize = 8;

/// Offset value meaning "no trace at this key".
pub const ABSENT_OFFSET: i64 = 0;

pub const MAX_KEYS: usize = 3;

/// Last 1-based byte location an int32 key can start at in a trace header.
pub const MAX_KEY_BYTE_LOC: i32 = (TRACE_HEADER_SIZE - 3) as i32;

pub const DEFAULT_MAX_INDEX_SLOTS: u64 = 1 << 28;

const _: () = { assert!(MAX_KEY_BYTE_LOC == 237); };
