use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::database::{ProfilePicture, ProfilePictureRepository, UserRepository};
use crate::error::{PicsError, PicsResult};
use crate::storage::{StorageBackend, StorageError};

/// The public url a stored picture is served from.
pub fn picture_url(user_id: &str, picture_id: i64) -> String {
    format!("/api/users/{}/profile_pic/{}", user_id, picture_id)
}

/// The storage directory holding a user's uploads.
#[inline]
fn user_directory(user_id: &str) -> String {
    format!("{}/profile_pics", user_id)
}

/// Coordinates the storage backend and the metadata rows for pictures.
///
/// The two systems are never updated atomically. Content is always
/// written before its row and removed before its row, so a failure can
/// leave unreferenced content after an upload or a row without content
/// after a delete. Both cases are logged and surfaced, never repaired here.
pub struct PictureController {
    storage: Arc<dyn StorageBackend>,
    users: UserRepository,
    pictures: ProfilePictureRepository,
}

impl PictureController {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        users: UserRepository,
        pictures: ProfilePictureRepository,
    ) -> Self {
        Self {
            storage,
            users,
            pictures,
        }
    }

    #[instrument(skip(self, content))]
    pub async fn upload(
        &self,
        user_id: &str,
        file_name: &str,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> PicsResult<ProfilePicture> {
        self.users.get(user_id).await?;

        let reference = self
            .storage
            .save_file(content, &user_directory(user_id), file_name)
            .await?;
        debug!("Upload stored @ {}", &reference);

        match self.pictures.create(user_id, &reference).await {
            Ok(picture) => {
                info!("Created picture {} for user {}", picture.id, user_id);
                Ok(picture)
            },
            Err(e) => {
                warn!(
                    "Content @ {} is orphaned, recording its metadata failed: {}",
                    &reference, e
                );
                Err(e)
            },
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, user_id: &str, picture_id: i64) -> PicsResult<Bytes> {
        let picture = self.lookup(user_id, picture_id).await?;

        let data = self.storage.retrieve_file(&picture.storage_reference).await?;
        debug!("Fetched {} bytes for picture {}", data.len(), picture_id);

        Ok(data)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: &str, picture_id: i64) -> PicsResult<()> {
        let picture = self.lookup(user_id, picture_id).await?;
        self.purge(&picture).await
    }

    /// Every picture the user owns, the user must exist.
    pub async fn list(&self, user_id: &str) -> PicsResult<Vec<ProfilePicture>> {
        self.users.get(user_id).await?;
        self.pictures.list_by_owner(user_id).await
    }

    /// Runs the delete flow for each of the user's pictures, stopping at
    /// the first failure. Returns how many were removed.
    ///
    /// The owner is going away, so a row whose content is already gone is
    /// dropped instead of blocking the user's removal.
    #[instrument(skip(self))]
    pub async fn delete_all_for(&self, user_id: &str) -> PicsResult<usize> {
        let pictures = self.pictures.list_by_owner(user_id).await?;

        for picture in pictures.iter() {
            match self.purge(picture).await {
                Err(PicsError::Storage(StorageError::NotFound(reference))) => {
                    warn!(
                        "Content @ {} for picture {} was already gone, dropping the row",
                        reference, picture.id
                    );
                    self.pictures.delete(picture.id).await?;
                },
                other => other?,
            }
        }

        Ok(pictures.len())
    }

    /// Resolves a picture id, hiding pictures which belong to someone else.
    async fn lookup(&self, user_id: &str, picture_id: i64) -> PicsResult<ProfilePicture> {
        let picture = self.pictures.get_by_id(picture_id).await?;

        if picture.owner_id != user_id {
            return Err(PicsError::PictureNotFound(picture_id));
        }

        Ok(picture)
    }

    async fn purge(&self, picture: &ProfilePicture) -> PicsResult<()> {
        self.storage.delete_file(&picture.storage_reference).await?;
        debug!("Content @ {} removed", &picture.storage_reference);

        if let Err(e) = self.pictures.delete(picture.id).await {
            warn!(
                "Picture {} now points at deleted content @ {}: {}",
                picture.id, &picture.storage_reference, e
            );
            return Err(e);
        }

        info!("Deleted picture {} for user {}", picture.id, &picture.owner_id);
        Ok(())
    }
}
