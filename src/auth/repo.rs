use crate::auth::repo_types::{Role, User};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

pub(crate) const USER_COLUMNS: &str = "id, username, email, first_name, last_name, phone, \
                                       password_hash, user_type, status, created_at, updated_at";

/// Fields for a new account; `password_hash` is already hashed.
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: Option<&'a str>,
    pub password_hash: &'a str,
    pub role: Role,
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Find a user by username or email (case-insensitive on email).
    pub async fn find_by_login(db: &PgPool, login: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR lower(email) = lower($1)"
        ))
        .bind(login)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_username(db: &PgPool, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(db)
        .await
    }

    pub async fn create(db: &PgPool, new: &NewUser<'_>) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, first_name, last_name, phone, password_hash, user_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.username)
        .bind(new.email)
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(new.phone)
        .bind(new.password_hash)
        .bind(new.role)
        .fetch_one(db)
        .await
    }

    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        first_name: &str,
        last_name: &str,
        phone: Option<&str>,
        email: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET first_name = $2, last_name = $3, phone = $4, email = $5, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .bind(phone)
        .bind(email)
        .fetch_one(db)
        .await
    }

    pub async fn set_password(
        conn: &mut PgConnection,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Creates the account or promotes an existing one with the same username to admin.
    pub async fn ensure_admin(
        db: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, user_type)
            VALUES ($1, $2, $3, 'admin')
            ON CONFLICT (username) DO UPDATE
               SET user_type = 'admin', status = 'active', updated_at = now()
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }
}
