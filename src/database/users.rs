use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::database::table::{Entity, Table};
use crate::error::{PicsError, PicsResult};

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: String,
    pub username: String,
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const KEY: &'static str = "user_id";
    const COLUMNS: &'static [&'static str] = &["user_id", "username"];
}

#[derive(Clone)]
pub struct UserRepository {
    table: Table<User>,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            table: Table::new(pool),
        }
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn create(&self, username: &str) -> PicsResult<User> {
        let user_id = Uuid::new_v4().to_string();
        let qry = self.table.insert_qry(&["user_id", "username"]);

        let user = sqlx::query_as::<_, User>(&qry)
            .bind(&user_id)
            .bind(username)
            .fetch_one(self.table.pool())
            .await?;

        debug!("Created user {}", &user.user_id);
        Ok(user)
    }

    pub async fn get(&self, user_id: &str) -> PicsResult<User> {
        self.table
            .fetch_one(user_id.to_string())
            .await?
            .ok_or_else(|| PicsError::UserNotFound(user_id.to_string()))
    }

    /// Removes the user row, deleting an unknown user is not an error.
    pub async fn delete(&self, user_id: &str) -> PicsResult<()> {
        let removed = self.table.delete(user_id.to_string()).await?;
        debug!("Deleted user {} ({} rows)", user_id, removed);
        Ok(())
    }
}
