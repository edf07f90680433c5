use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use hashbrown::HashMap;
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::storage::{
    clean_file_name,
    relative_directory,
    timestamped_name,
    StorageBackend,
    StorageError,
    StorageResult,
    CHUNK_SIZE,
    MAX_NAME_ATTEMPTS,
};

/// Keeps every upload in process memory.
///
/// Content does not survive a restart, which makes this backend useful
/// for tests and throwaway deployments only.
#[derive(Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of objects currently held.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn save_file(
        &self,
        content: &mut (dyn AsyncRead + Unpin + Send),
        directory: &str,
        suggested_name: &str,
    ) -> StorageResult<String> {
        let name = clean_file_name(suggested_name)?;
        let directory = relative_directory(directory)?;

        let mut buff = BytesMut::new();
        loop {
            buff.reserve(CHUNK_SIZE);
            if content.read_buf(&mut buff).await? == 0 {
                break;
            }
        }
        let data = buff.freeze();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let key = directory.join(timestamped_name(&name)).display().to_string();

            let mut objects = self.objects.write();
            if objects.contains_key(&key) {
                continue;
            }

            debug!("Storing {} bytes in memory @ {}", data.len(), &key);
            objects.insert(key.clone(), data);
            return Ok(key);
        }

        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free object name for {:?}", name),
        )))
    }

    async fn retrieve_file(&self, reference: &str) -> StorageResult<Bytes> {
        debug!("Retrieving object @ {}", reference);
        self.objects
            .read()
            .get(reference)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(reference.to_string()))
    }

    async fn delete_file(&self, reference: &str) -> StorageResult<()> {
        debug!("Purging object @ {}", reference);
        self.objects
            .write()
            .remove(reference)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(reference.to_string()))
    }
}
