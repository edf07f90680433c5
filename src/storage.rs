use std::path::{Component, Path, PathBuf};

use chrono::Utc;

pub mod error;
pub mod template;

pub mod backends {
    pub mod filesystem;
    pub mod memory;
    mod register;

    pub use register::BackendConfigs;
}

pub use error::{StorageError, StorageResult};
pub use template::StorageBackend;

/// The size of each read when draining an upload stream.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// How many fresh timestamps are drawn before giving up on a free name.
pub const MAX_NAME_ATTEMPTS: usize = 8;

/// Reduces a client supplied file name to something safe to store.
///
/// Only the final path component is kept, so `../../etc/passwd` becomes
/// `passwd` and `C:\pics\me.png` becomes `me.png`.
pub fn clean_file_name(suggested: &str) -> StorageResult<String> {
    let base = suggested
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return Err(StorageError::InvalidName(suggested.to_string()));
    }

    Ok(cleaned.to_string())
}

/// Produces the `{nanosecond_timestamp}_{name}` form every backend stores under.
#[inline]
pub fn timestamped_name(name: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}_{}", nanos, name)
}

/// Validates a destination directory, it must stay relative to the backend root.
pub fn relative_directory(directory: &str) -> StorageResult<PathBuf> {
    let path = Path::new(directory);
    let is_plain = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

    if !is_plain {
        return Err(StorageError::InvalidPath(directory.to_string()));
    }

    Ok(path.to_path_buf())
}
