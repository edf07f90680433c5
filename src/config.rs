use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::database::DatabaseConfig;
use crate::storage::backends::BackendConfigs;

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// The set storage backend configuration.
    pub backend: BackendConfigs,

    /// Where user and picture metadata is kept.
    pub database: DatabaseConfig,
}

impl RuntimeConfig {
    /// Loads the configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// The configuration used when no file is given: uploads on the local
    /// disk and metadata in the given database.
    pub fn with_defaults(uploads_dir: PathBuf, connection_uri: String, pool_size: u32) -> Self {
        Self {
            backend: BackendConfigs::FileSystem {
                directory: uploads_dir,
            },
            database: DatabaseConfig {
                connection_uri,
                pool_size,
            },
        }
    }
}
