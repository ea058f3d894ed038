use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::auth::{
    repo::USER_COLUMNS,
    repo_types::{Role, User, UserStatus},
};
use crate::db::Removal;

#[derive(Debug, Default)]
pub struct UserFilter {
    /// Already a LIKE pattern.
    pub pattern: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

pub struct AdminChanges<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: Option<&'a str>,
    pub role: Role,
    pub status: UserStatus,
}

pub async fn list(
    db: &PgPool,
    f: &UserFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<User>, i64), sqlx::Error> {
    const WHERE: &str = r#"
         WHERE ($1::text IS NULL OR username ILIKE $1 OR email ILIKE $1
                OR first_name ILIKE $1 OR last_name ILIKE $1)
           AND ($2::text IS NULL OR user_type = $2)
           AND ($3::text IS NULL OR status = $3)
    "#;

    let rows = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users {WHERE} ORDER BY created_at DESC, id LIMIT $4 OFFSET $5"
    ))
    .bind(&f.pattern)
    .bind(f.role)
    .bind(f.status)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users {WHERE}"))
        .bind(&f.pattern)
        .bind(f.role)
        .bind(f.status)
        .fetch_one(db)
        .await?;

    Ok((rows, total))
}

pub async fn update(db: &PgPool, id: Uuid, c: &AdminChanges<'_>) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
           SET first_name = $2, last_name = $3, phone = $4, user_type = $5, status = $6,
               updated_at = now()
         WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(c.first_name)
    .bind(c.last_name)
    .bind(c.phone)
    .bind(c.role)
    .bind(c.status)
    .fetch_optional(db)
    .await
}

/// Deletes a user unless they hold active borrows. The `FOR UPDATE` lock
/// conflicts with the key-share lock a new borrow record's foreign key takes on
/// the user row, so no borrow can be created while the check is in flight.
pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<Removal, sqlx::Error> {
    let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    if found.is_none() {
        return Ok(Removal::Missing);
    }
    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM borrow_record WHERE user_id = $1 AND NOT is_returned",
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    if active > 0 {
        return Ok(Removal::InUse(active));
    }
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(Removal::Removed)
}
