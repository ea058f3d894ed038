use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::{
    auth::{repo_types::User, services::hash_password},
    config::AppConfig,
    error::{ApiError, ApiResult},
};

/// Outcome of deleting a row that borrow records may still point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    Missing,
    /// Number of active borrows holding the row.
    InUse(i64),
}

impl Removal {
    pub fn into_result(
        self,
        missing: &str,
        in_use: impl FnOnce(i64) -> String,
    ) -> ApiResult<()> {
        match self {
            Removal::Removed => Ok(()),
            Removal::Missing => Err(ApiError::not_found(missing)),
            Removal::InUse(n) => Err(ApiError::conflict(in_use(n))),
        }
    }
}

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("connect to database")
}

pub async fn migrate(db: &PgPool) {
    if let Err(e) = sqlx::migrate!("./migrations").run(db).await {
        warn!(error = %e, "migrations folder not found or migration failed; continuing");
    }
}

/// Ensures the configured bootstrap admin exists and holds the admin role.
pub async fn bootstrap_admin(db: &PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let Some(admin) = &config.bootstrap_admin else {
        return Ok(());
    };
    let hash = hash_password(&admin.password)?;
    let user = User::ensure_admin(db, &admin.username, &admin.email.to_lowercase(), &hash)
        .await
        .context("ensure bootstrap admin")?;
    info!(user_id = %user.id, username = %user.username, "bootstrap admin ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn removal_outcomes_map_to_statuses() {
        assert!(Removal::Removed.into_result("gone", |_| String::new()).is_ok());

        let missing = Removal::Missing.into_result("Book not found", |_| String::new());
        assert_eq!(missing.unwrap_err().status(), StatusCode::NOT_FOUND);

        let err = Removal::InUse(2)
            .into_result("User not found", |n| format!("{n} active borrow(s)"))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("2 active borrow(s)"));
    }
}
