//! Volume settings persisted as JSON next to the data.

use crate::consts::{DEFAULT_MAX_INDEX_SLOTS, MAX_KEY_BYTE_LOC};
use crate::errors::{Result, SegyError};
use crate::header::{names, HeaderCatalog};
use crate::keys::IndexType;
use crate::samples::{ByteOrder, SampleFormat};
use crate::utils::fsync_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZDomain {
    #[default]
    Time,
    Depth,
}

/// Byte locations are 1-based, as printed in the SEG-Y standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub index_type: IndexType,
    pub cdp_byte_loc: i32,
    pub inline_byte_loc: i32,
    pub xline_byte_loc: i32,
    pub offset_byte_loc: i32,
    pub x_coord_byte_loc: i32,
    pub y_coord_byte_loc: i32,
    /// None: take the code from the binary header.
    pub sample_format: Option<SampleFormat>,
    pub byte_order: ByteOrder,
    pub z_domain: ZDomain,
    /// Overrides the binary-header sample interval (ms or m).
    pub sample_rate: Option<f32>,
    pub max_index_slots: u64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            index_type: IndexType::PostStack3d,
            cdp_byte_loc: 21,
            inline_byte_loc: 189,
            xline_byte_loc: 193,
            offset_byte_loc: 37,
            x_coord_byte_loc: 181,
            y_coord_byte_loc: 185,
            sample_format: None,
            byte_order: ByteOrder::BigEndian,
            z_domain: ZDomain::Time,
            sample_rate: None,
            max_index_slots: DEFAULT_MAX_INDEX_SLOTS,
        }
    }
}

impl VolumeConfig {
    pub fn new(index_type: IndexType) -> Self {
        Self { index_type, ..Self::default() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: VolumeConfig = serde_json::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        let mut tmp = PathBuf::from(path.as_os_str());
        tmp.set_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        f.sync_all()?;
        drop(f);
        fs::rename(&tmp, path)?;
        fsync_dir(path)?;
        Ok(())
    }

    pub fn byte_loc(&self, field: &str) -> Option<i32> {
        match field {
            names::CDP => Some(self.cdp_byte_loc),
            names::INLINE => Some(self.inline_byte_loc),
            names::XLINE => Some(self.xline_byte_loc),
            names::OFFSET => Some(self.offset_byte_loc),
            names::X => Some(self.x_coord_byte_loc),
            names::Y => Some(self.y_coord_byte_loc),
            _ => None,
        }
    }

    /// Byte locations of the index keys, slowest dimension first.
    pub fn key_byte_locs(&self) -> Vec<i32> {
        self.index_type
            .key_names()
            .iter()
            .filter_map(|n| self.byte_loc(n))
            .collect()
    }

    fn located_fields(&self) -> impl Iterator<Item = (&'static str, i32)> + '_ {
        self.index_type
            .key_names()
            .iter()
            .copied()
            .chain([names::X, names::Y])
            .filter_map(|n| self.byte_loc(n).map(|loc| (n, loc)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_type == IndexType::Unknown {
            return Err(SegyError::InvalidInput("index_type must be set".into()));
        }
        for (name, loc) in self.located_fields() {
            if !(1..=MAX_KEY_BYTE_LOC).contains(&loc) {
                return Err(SegyError::InvalidInput(format!(
                    "{name} byte location {loc} outside 1..={MAX_KEY_BYTE_LOC}"
                )));
            }
        }
        if self.max_index_slots == 0 {
            return Err(SegyError::InvalidInput("max_index_slots must be positive".into()));
        }
        if let Some(r) = self.sample_rate {
            if !(r.is_finite() && r > 0.0) {
                return Err(SegyError::InvalidInput(format!("sample_rate {r} must be positive")));
            }
        }
        Ok(())
    }

    /// The trace-header catalog for this volume with the key and coordinate
    /// fields moved to their configured byte locations.
    pub fn trace_catalog(&self) -> Result<HeaderCatalog> {
        let base = self.index_type.catalog()?;
        let moves: Vec<(&str, usize)> = self
            .located_fields()
            .map(|(n, loc)| (n, (loc - 1) as usize))
            .collect();
        base.relocate(&moves)
    }
}
