pub mod consts;
pub mod errors;
pub mod utils;
pub mod header;
pub mod text;
pub mod samples;
pub mod keys;
pub mod trace;
pub mod config;
pub mod volume;
pub mod accessor;
pub mod index;
pub mod indexer;
pub mod store;

pub use accessor::{AccessMode, FileAccessor};
pub use config::{VolumeConfig, ZDomain};
pub use errors::{Result, SegyError};
pub use header::{FieldFormat, FieldValue, FieldValues, HeaderBuffer, HeaderCatalog, HeaderField};
pub use index::TraceIndex;
pub use indexer::{CancelFlag, NoopMonitor, ScanMonitor, TraceIndexBuilder};
pub use keys::{default_key_fn, grid, IndexType, KeyFn, KeyRange, KeyStats, TraceKey};
pub use samples::{ByteOrder, SampleFormat};
pub use store::TraceStore;
pub use text::TextHeader;
pub use trace::{Trace, TraceStatus};
pub use volume::{MeasurementSystem, VolumeInfo, VolumeLayout};
