use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

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

/// Produces the on disk name for a cleaned upload name.
pub type NameSource = Box<dyn Fn(&str) -> String + Send + Sync>;

pub struct FileSystemBackend {
    directory: PathBuf,
    next_name: NameSource,
}

impl FileSystemBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self::with_name_source(dir, Box::new(timestamped_name))
    }

    pub fn with_name_source(dir: PathBuf, next_name: NameSource) -> Self {
        Self {
            directory: dir,
            next_name,
        }
    }

    #[inline]
    fn format_path(&self, directory: &str) -> StorageResult<PathBuf> {
        Ok(self.directory.join(relative_directory(directory)?))
    }

    /// Turns a reference back into a path, refusing anything outside the root.
    ///
    /// Only the part below the root is checked for `..`, the root itself
    /// may be configured with parent components.
    fn resolve(&self, reference: &str) -> StorageResult<PathBuf> {
        let path = PathBuf::from(reference);
        let below_root = path
            .strip_prefix(&self.directory)
            .map_err(|_| StorageError::InvalidReference(reference.to_string()))?;

        let escapes = below_root
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if escapes {
            return Err(StorageError::InvalidReference(reference.to_string()));
        }

        Ok(path)
    }

    /// Opens a brand new file for the upload, drawing a new timestamp if
    /// the name is already taken.
    async fn create_unique(&self, store_in: &Path, name: &str) -> StorageResult<(PathBuf, File)> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = store_in.join((self.next_name)(name));

            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(ref e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Name collision @ {:?}, retrying", &path);
                    continue;
                },
                Err(other) => return Err(other.into()),
            }
        }

        Err(StorageError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for {:?} in {:?}", name, store_in),
        )))
    }
}

async fn copy_chunked(
    content: &mut (dyn AsyncRead + Unpin + Send),
    file: &mut File,
) -> std::io::Result<u64> {
    let mut buff = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let n = content.read(&mut buff).await?;
        if n == 0 {
            break;
        }

        file.write_all(&buff[..n]).await?;
        written += n as u64;
    }

    file.flush().await?;
    file.sync_all().await?;

    Ok(written)
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    async fn save_file(
        &self,
        content: &mut (dyn AsyncRead + Unpin + Send),
        directory: &str,
        suggested_name: &str,
    ) -> StorageResult<String> {
        let name = clean_file_name(suggested_name)?;
        let store_in = self.format_path(directory)?;
        tokio::fs::create_dir_all(&store_in).await?;

        let (path, mut file) = self.create_unique(&store_in, &name).await?;

        debug!("Storing upload @ {:?}", &path);
        match copy_chunked(content, &mut file).await {
            Ok(written) => {
                debug!("Stored {} bytes @ {:?}", written, &path);
                Ok(path.display().to_string())
            },
            Err(e) => {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove partial upload @ {:?}: {}", &path, cleanup);
                }
                Err(e.into())
            },
        }
    }

    async fn retrieve_file(&self, reference: &str) -> StorageResult<Bytes> {
        let path = self.resolve(reference)?;

        debug!("Retrieving upload @ {:?}", &path);
        let mut file = File::open(&path)
            .await
            .map_err(|e| StorageError::from_io(reference, e))?;

        let size = file.metadata().await?.len();
        let mut buff = Vec::with_capacity(usize::try_from(size).unwrap_or(0));

        // read_to_end keeps reading until EOF, a single read may return less.
        file.read_to_end(&mut buff).await?;

        Ok(Bytes::from(buff))
    }

    async fn delete_file(&self, reference: &str) -> StorageResult<()> {
        let path = self.resolve(reference)?;

        debug!("Purging upload @ {:?}", &path);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| StorageError::from_io(reference, e))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use super::*;

    /// Yields some bytes and then fails, like a client dropping mid upload.
    struct BrokenStream {
        sent: bool,
    }

    impl AsyncRead for BrokenStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(std::io::Error::new(
                    ErrorKind::ConnectionReset,
                    "client went away",
                )));
            }

            self.sent = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    fn backend() -> (FileSystemBackend, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let backend = FileSystemBackend::new(dir.path().join("uploads"));
        (backend, dir)
    }

    #[tokio::test]
    async fn test_save_creates_nested_directories() -> anyhow::Result<()> {
        let (backend, dir) = backend();
        let mut data: &[u8] = b"0123456789";

        let reference = backend
            .save_file(&mut data, "some-user/profile_pics", "me.png")
            .await?;

        let expected_dir = dir.path().join("uploads/some-user/profile_pics");
        assert!(expected_dir.is_dir());

        let path = PathBuf::from(&reference);
        assert_eq!(path.parent(), Some(expected_dir.as_path()));

        let file_name = path.file_name().unwrap().to_str().unwrap();
        let (nanos, name) = file_name.split_once('_').unwrap();
        assert!(nanos.parse::<i64>().is_ok());
        assert_eq!(name, "me.png");

        Ok(())
    }

    #[tokio::test]
    async fn test_round_trip_larger_than_a_chunk() -> anyhow::Result<()> {
        let (backend, _dir) = backend();
        let original: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let mut data: &[u8] = &original;

        let reference = backend.save_file(&mut data, "u/profile_pics", "big.bin").await?;
        let fetched = backend.retrieve_file(&reference).await?;

        assert_eq!(fetched.len(), original.len());
        assert_eq!(fetched.as_ref(), original.as_slice());

        Ok(())
    }

    #[tokio::test]
    async fn test_same_name_never_overwrites() -> anyhow::Result<()> {
        let (backend, _dir) = backend();

        let mut first: &[u8] = b"first";
        let mut second: &[u8] = b"second";
        let a = backend.save_file(&mut first, "u/profile_pics", "me.png").await?;
        let b = backend.save_file(&mut second, "u/profile_pics", "me.png").await?;

        assert_ne!(a, b);
        assert_eq!(backend.retrieve_file(&a).await?.as_ref(), b"first");
        assert_eq!(backend.retrieve_file(&b).await?.as_ref(), b"second");

        Ok(())
    }

    #[tokio::test]
    async fn test_empty_upload_is_stored() -> anyhow::Result<()> {
        let (backend, _dir) = backend();
        let mut data: &[u8] = b"";

        let reference = backend.save_file(&mut data, "u/profile_pics", "empty").await?;
        assert!(backend.retrieve_file(&reference).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_content_is_not_found() -> anyhow::Result<()> {
        let (backend, _dir) = backend();
        let mut data: &[u8] = b"bytes";

        let reference = backend.save_file(&mut data, "u/profile_pics", "me.png").await?;
        backend.delete_file(&reference).await?;

        assert!(matches!(
            backend.retrieve_file(&reference).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            backend.delete_file(&reference).await,
            Err(StorageError::NotFound(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_references_are_rejected() {
        let (backend, dir) = backend();
        let outside = dir.path().join("elsewhere.txt").display().to_string();
        let sneaky = dir.path().join("uploads/../elsewhere.txt").display().to_string();

        assert!(matches!(
            backend.retrieve_file(&outside).await,
            Err(StorageError::InvalidReference(_))
        ));
        assert!(matches!(
            backend.delete_file(&sneaky).await,
            Err(StorageError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_in_names_and_directories() -> anyhow::Result<()> {
        let (backend, dir) = backend();

        let mut data: &[u8] = b"bytes";
        let reference = backend
            .save_file(&mut data, "u/profile_pics", "../../escape.png")
            .await?;
        assert!(PathBuf::from(&reference).starts_with(dir.path().join("uploads/u/profile_pics")));

        let mut data: &[u8] = b"bytes";
        let res = backend.save_file(&mut data, "../outside", "me.png").await;
        assert!(matches!(res, Err(StorageError::InvalidPath(_))));

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_file() -> anyhow::Result<()> {
        let (backend, dir) = backend();
        let mut stream = BrokenStream { sent: false };

        let res = backend.save_file(&mut stream, "u/profile_pics", "me.png").await;
        assert!(matches!(res, Err(StorageError::Io(_))));

        let mut entries = tokio::fs::read_dir(dir.path().join("uploads/u/profile_pics")).await?;
        assert!(entries.next_entry().await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_root_with_parent_components_round_trips() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("app"))?;
        let backend = FileSystemBackend::new(dir.path().join("app/../shared/uploads"));

        let mut data: &[u8] = b"0123456789";
        let reference = backend.save_file(&mut data, "u/profile_pics", "me.png").await?;
        assert!(dir.path().join("shared/uploads/u/profile_pics").is_dir());

        assert_eq!(backend.retrieve_file(&reference).await?.as_ref(), b"0123456789");
        backend.delete_file(&reference).await?;
        assert!(matches!(
            backend.retrieve_file(&reference).await,
            Err(StorageError::NotFound(_))
        ));

        let sneaky = dir
            .path()
            .join("app/../shared/uploads/u/../../../elsewhere.txt")
            .display()
            .to_string();
        assert!(matches!(
            backend.retrieve_file(&sneaky).await,
            Err(StorageError::InvalidReference(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_saves_of_one_name() -> anyhow::Result<()> {
        let (backend, dir) = backend();
        let backend = Arc::new(backend);

        let tasks = (0..32).map(|i| {
            let backend = backend.clone();
            tokio::spawn(async move {
                let body = format!("upload {}", i).into_bytes();
                let mut data: &[u8] = &body;
                let reference = backend.save_file(&mut data, "u/profile_pics", "me.png").await?;
                Ok::<_, StorageError>((i, reference))
            })
        });

        let mut references = HashSet::new();
        for result in futures::future::join_all(tasks).await {
            let (i, reference) = result??;
            let stored = backend.retrieve_file(&reference).await?;
            assert_eq!(stored.as_ref(), format!("upload {}", i).as_bytes());
            references.insert(reference);
        }

        assert_eq!(references.len(), 32);
        let count = std::fs::read_dir(dir.path().join("uploads/u/profile_pics"))?.count();
        assert_eq!(count, 32);

        Ok(())
    }

    #[tokio::test]
    async fn test_taken_name_draws_a_fresh_one() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let backend = FileSystemBackend::with_name_source(
            dir.path().to_path_buf(),
            Box::new(move |name: &str| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    format!("taken_{}", name)
                } else {
                    format!("fresh_{}", name)
                }
            }),
        );

        let store_in = dir.path().join("u/profile_pics");
        std::fs::create_dir_all(&store_in)?;
        std::fs::write(store_in.join("taken_me.png"), b"existing")?;

        let mut data: &[u8] = b"new upload";
        let reference = backend.save_file(&mut data, "u/profile_pics", "me.png").await?;

        assert_eq!(PathBuf::from(&reference), store_in.join("fresh_me.png"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(std::fs::read(store_in.join("taken_me.png"))?, b"existing");
        assert_eq!(backend.retrieve_file(&reference).await?.as_ref(), b"new upload");

        Ok(())
    }

    #[tokio::test]
    async fn test_gives_up_when_every_name_is_taken() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = FileSystemBackend::with_name_source(
            dir.path().to_path_buf(),
            Box::new(|name: &str| format!("taken_{}", name)),
        );

        let store_in = dir.path().join("u/profile_pics");
        std::fs::create_dir_all(&store_in)?;
        std::fs::write(store_in.join("taken_me.png"), b"existing")?;

        let mut data: &[u8] = b"new upload";
        let res = backend.save_file(&mut data, "u/profile_pics", "me.png").await;

        assert!(matches!(res, Err(StorageError::Io(ref e)) if e.kind() == ErrorKind::AlreadyExists));
        assert_eq!(std::fs::read(store_in.join("taken_me.png"))?, b"existing");
        assert_eq!(std::fs::read_dir(&store_in)?.count(), 1);

        Ok(())
    }
}
