use sqlx::{FromRow, PgConnection};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct OtpRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub is_used: bool,
}

/// Marks every unused code of the user as used, then stores a fresh one.
pub async fn issue(
    conn: &mut PgConnection,
    user_id: Uuid,
    code: &str,
    expires_at: OffsetDateTime,
) -> Result<OtpRecord, sqlx::Error> {
    sqlx::query("UPDATE password_reset_otp SET is_used = TRUE WHERE user_id = $1 AND NOT is_used")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query_as::<_, OtpRecord>(
        r#"
        INSERT INTO password_reset_otp (user_id, code, expires_at)
        VALUES ($1, $2, $3)
        RETURNING id, user_id, code, created_at, expires_at, is_used
        "#,
    )
    .bind(user_id)
    .bind(code)
    .bind(expires_at)
    .fetch_one(&mut *conn)
    .await
}

/// Newest unused code matching `user_id` and `code`.
pub async fn find_unused(
    conn: &mut PgConnection,
    user_id: Uuid,
    code: &str,
) -> Result<Option<OtpRecord>, sqlx::Error> {
    sqlx::query_as::<_, OtpRecord>(
        r#"
        SELECT id, user_id, code, created_at, expires_at, is_used
          FROM password_reset_otp
         WHERE user_id = $1 AND code = $2 AND NOT is_used
         ORDER BY created_at DESC
         LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(code)
    .fetch_optional(conn)
    .await
}

/// Returns `false` when the code was already consumed by someone else.
pub async fn consume(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("UPDATE password_reset_otp SET is_used = TRUE WHERE id = $1 AND NOT is_used")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected() == 1)
}
