use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::storage::StorageResult;

/// A place the raw bytes of uploads live.
///
/// Backends hand out opaque references when saving; only the backend
/// which produced a reference is expected to resolve it again.
#[async_trait]
pub trait StorageBackend: Sync + Send + 'static {
    /// Drains `content` into a new object inside `directory`.
    ///
    /// The object name is derived from `suggested_name` and never
    /// replaces existing content. The returned reference addresses the
    /// stored bytes for later `retrieve_file` and `delete_file` calls.
    async fn save_file(
        &self,
        content: &mut (dyn AsyncRead + Unpin + Send),
        directory: &str,
        suggested_name: &str,
    ) -> StorageResult<String>;

    /// Returns the complete content behind a reference.
    async fn retrieve_file(&self, reference: &str) -> StorageResult<Bytes>;

    /// Removes the content behind a reference.
    ///
    /// Deleting content which no longer exists fails with `NotFound`.
    async fn delete_file(&self, reference: &str) -> StorageResult<()>;
}
