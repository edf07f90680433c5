use thiserror::Error;

/// Failures raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("stored content not found: {0}")]
    NotFound(String),

    #[error("invalid destination directory: {0}")]
    InvalidPath(String),

    #[error("reference is not owned by this backend: {0}")]
    InvalidReference(String),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Maps a not-found I/O error onto `NotFound` for the given reference.
    pub fn from_io(reference: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(reference.to_string())
        } else {
            Self::Io(err)
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
