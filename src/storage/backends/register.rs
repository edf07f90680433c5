use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::storage::StorageBackend;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfigs {
    /// Uploads are written below `directory` on the local disk.
    FileSystem {
        directory: PathBuf,
    },

    /// Uploads are kept in process memory and lost on shutdown.
    Memory,
}

impl BackendConfigs {
    pub fn connect(&self) -> Arc<dyn StorageBackend> {
        match self {
            Self::FileSystem { directory } => {
                info!("Using filesystem storage @ {:?}", directory);
                Arc::new(super::filesystem::FileSystemBackend::new(directory.clone()))
            },
            Self::Memory => {
                warn!("Using in-memory storage, uploads will not survive a restart");
                Arc::new(super::memory::MemoryBackend::new())
            },
        }
    }
}
