use std::marker::PhantomData;

use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Encode, FromRow, Type};

/// A row type which maps onto a single table.
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static {
    /// The table the rows live in.
    const TABLE: &'static str;

    /// The primary key column.
    const KEY: &'static str;

    /// Every column selected when loading a row.
    const COLUMNS: &'static [&'static str];
}

fn build_select_qry(table: &str, columns: &[&str], column: &str) -> String {
    format!(
        "SELECT {columns} FROM {table} WHERE {column} = ? ORDER BY rowid;",
        columns = columns.join(", "),
        table = table,
        column = column,
    )
}

fn build_insert_qry(table: &str, columns: &[&str], returning: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {table} ({columns}) VALUES ({placeholders}) RETURNING {returning};",
        table = table,
        columns = columns.join(", "),
        placeholders = placeholders,
        returning = returning.join(", "),
    )
}

fn build_delete_qry(table: &str, column: &str) -> String {
    format!("DELETE FROM {table} WHERE {column} = ?;", table = table, column = column)
}

/// Shared query plumbing for any `Entity`.
///
/// Entity specific repositories only bind their own insert values,
/// lookups and deletes are done here once.
pub struct Table<E> {
    pool: SqlitePool,
    entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Table<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            entity: PhantomData,
        }
    }
}

impl<E: Entity> Table<E> {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            entity: PhantomData,
        }
    }

    #[inline]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The insert statement for the given columns returning the full row.
    pub fn insert_qry(&self, columns: &[&str]) -> String {
        build_insert_qry(E::TABLE, columns, E::COLUMNS)
    }

    pub async fn fetch_one<V>(&self, key: V) -> sqlx::Result<Option<E>>
    where
        V: for<'q> Encode<'q, Sqlite> + Type<Sqlite> + Send + 'static,
    {
        let qry = build_select_qry(E::TABLE, E::COLUMNS, E::KEY);
        sqlx::query_as::<_, E>(&qry)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    /// All rows where `column` matches, in insertion order.
    pub async fn fetch_where<V>(&self, column: &str, value: V) -> sqlx::Result<Vec<E>>
    where
        V: for<'q> Encode<'q, Sqlite> + Type<Sqlite> + Send + 'static,
    {
        let qry = build_select_qry(E::TABLE, E::COLUMNS, column);
        sqlx::query_as::<_, E>(&qry)
            .bind(value)
            .fetch_all(&self.pool)
            .await
    }

    /// Deletes by primary key, returning the number of removed rows.
    pub async fn delete<V>(&self, key: V) -> sqlx::Result<u64>
    where
        V: for<'q> Encode<'q, Sqlite> + Type<Sqlite> + Send + 'static,
    {
        let qry = build_delete_qry(E::TABLE, E::KEY);
        let result = sqlx::query(&qry).bind(key).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
