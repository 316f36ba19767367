use thiserror::Error;

#[derive(Debug, Error)]
pub enum SegyError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Persist: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Bad index file: {0}")]
    Format(String),

    #[error("Out of range: {0}")]
    Range(String),

    #[error("Unsupported: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File session is not open")]
    NotOpen,

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Index grid of {slots} slots exceeds the limit of {limit}")]
    IndexTooLarge { slots: u64, limit: u64 },
}

impl SegyError {
    /// Errors that mean the index file must be deleted and rebuilt.
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, SegyError::Format(_) | SegyError::UnsupportedFormat(_))
    }
}

pub type Result<T> = std::result::Result<T, SegyError>;
