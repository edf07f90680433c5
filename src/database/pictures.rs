use sqlx::{FromRow, SqlitePool};

use crate::database::table::{Entity, Table};
use crate::error::{PicsError, PicsResult};

/// The metadata row linking a stored upload to its owner.
#[derive(Debug, Clone, FromRow)]
pub struct ProfilePicture {
    pub id: i64,

    /// The opaque reference handed out by the storage backend.
    #[sqlx(rename = "file_path")]
    pub storage_reference: String,

    #[sqlx(rename = "user_id")]
    pub owner_id: String,
}

impl Entity for ProfilePicture {
    const TABLE: &'static str = "profile_pictures";
    const KEY: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "file_path", "user_id"];
}

#[derive(Clone)]
pub struct ProfilePictureRepository {
    table: Table<ProfilePicture>,
}

impl ProfilePictureRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            table: Table::new(pool),
        }
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn create(&self, owner_id: &str, storage_reference: &str) -> PicsResult<ProfilePicture> {
        let qry = self.table.insert_qry(&["file_path", "user_id"]);

        let picture = sqlx::query_as::<_, ProfilePicture>(&qry)
            .bind(storage_reference)
            .bind(owner_id)
            .fetch_one(self.table.pool())
            .await?;

        debug!("Recorded picture {} for user {}", picture.id, owner_id);
        Ok(picture)
    }

    pub async fn get_by_id(&self, id: i64) -> PicsResult<ProfilePicture> {
        self.table
            .fetch_one(id)
            .await?
            .ok_or(PicsError::PictureNotFound(id))
    }

    /// Every picture owned by the user, oldest first. Empty when they have none.
    pub async fn list_by_owner(&self, owner_id: &str) -> PicsResult<Vec<ProfilePicture>> {
        Ok(self.table.fetch_where("user_id", owner_id.to_string()).await?)
    }

    /// Removes the row, deleting an unknown id is not an error.
    pub async fn delete(&self, id: i64) -> PicsResult<()> {
        let removed = self.table.delete(id).await?;
        debug!("Deleted picture {} ({} rows)", id, removed);
        Ok(())
    }
}
