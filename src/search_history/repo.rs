use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    General,
    Title,
    Author,
    Category,
}

/// Search history row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SearchEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub search_query: String,
    pub search_type: SearchType,
    pub results_count: i32,
    pub search_context: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const ENTRY_COLUMNS: &str =
    "id, user_id, search_query, search_type, results_count, search_context, created_at";

pub struct NewEntry<'a> {
    pub query: &'a str,
    pub search_type: SearchType,
    pub results_count: i32,
    pub context: &'a str,
}

pub async fn exists_since(
    db: &PgPool,
    user_id: Uuid,
    query: &str,
    context: &str,
    since: OffsetDateTime,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM search_history
             WHERE user_id = $1 AND search_query = $2 AND search_context = $3
               AND created_at >= $4
        )
        "#,
    )
    .bind(user_id)
    .bind(query)
    .bind(context)
    .bind(since)
    .fetch_one(db)
    .await
}

pub async fn insert(db: &PgPool, user_id: Uuid, e: &NewEntry<'_>) -> Result<SearchEntry, sqlx::Error> {
    sqlx::query_as::<_, SearchEntry>(&format!(
        r#"
        INSERT INTO search_history (user_id, search_query, search_type, results_count, search_context)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(e.query)
    .bind(e.search_type)
    .bind(e.results_count)
    .bind(e.context)
    .fetch_one(db)
    .await
}

pub async fn recent(
    db: &PgPool,
    user_id: Uuid,
    context: Option<&str>,
    limit: i64,
) -> Result<(Vec<SearchEntry>, i64), sqlx::Error> {
    let rows = sqlx::query_as::<_, SearchEntry>(&format!(
        r#"
        SELECT {ENTRY_COLUMNS} FROM search_history
         WHERE user_id = $1 AND ($2::text IS NULL OR search_context = $2)
         ORDER BY created_at DESC, id
         LIMIT $3
        "#
    ))
    .bind(user_id)
    .bind(context)
    .bind(limit)
    .fetch_all(db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM search_history WHERE user_id = $1 AND ($2::text IS NULL OR search_context = $2)",
    )
    .bind(user_id)
    .bind(context)
    .fetch_one(db)
    .await?;

    Ok((rows, total))
}

pub async fn clear(db: &PgPool, user_id: Uuid, context: Option<&str>) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        "DELETE FROM search_history WHERE user_id = $1 AND ($2::text IS NULL OR search_context = $2)",
    )
    .bind(user_id)
    .bind(context)
    .execute(db)
    .await?;
    Ok(res.rows_affected())
}

/// Deletes one entry owned by `user_id`.
pub async fn delete_one(db: &PgPool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM search_history WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}
