use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

pub mod pictures;
pub mod table;
pub mod users;

pub use pictures::{ProfilePicture, ProfilePictureRepository};
pub use users::{User, UserRepository};

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY NOT NULL,
        username TEXT NOT NULL
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS profile_pictures (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL,
        user_id TEXT NOT NULL REFERENCES users (user_id)
    )"#,
    r#"
    CREATE INDEX IF NOT EXISTS profile_pictures_user_id
        ON profile_pictures (user_id)"#,
];

/// The configuration for the metadata database.
///
/// The `connection_uri` should be formatted as a direct connect
/// uri. e.g. `sqlite://profile_pics.db`
///
/// The `pool_size` determines the *maximum* amount of pool connections.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub connection_uri: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

const fn default_pool_size() -> u32 {
    10
}

/// Connects to the database and makes sure the tables exist.
pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&cfg.connection_uri)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.pool_size)
        .connect_with(options)
        .await?;

    ensure_tables(&pool).await?;

    Ok(pool)
}

pub async fn ensure_tables(pool: &SqlitePool) -> sqlx::Result<()> {
    info!("building tables");

    for qry in TABLES {
        sqlx::query(qry).execute(pool).await?;
    }

    Ok(())
}
