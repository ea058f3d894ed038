//! Current role and status of an account, consulted on every authenticated request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRef;
use sqlx::{FromRow, PgPool};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repo_types::{Role, UserStatus};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct Standing {
    #[sqlx(rename = "user_type")]
    pub role: Role,
    pub status: UserStatus,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// `None` when the account no longer exists.
    async fn standing(&self, id: Uuid) -> anyhow::Result<Option<Standing>>;
}

/// Handle the auth extractors pull out of the router state.
#[derive(Clone)]
pub struct Accounts(pub Arc<dyn AccountDirectory>);

impl FromRef<AppState> for Accounts {
    fn from_ref(state: &AppState) -> Self {
        Accounts(state.accounts.clone())
    }
}

#[derive(Clone)]
pub struct PgAccounts {
    db: PgPool,
}

impl PgAccounts {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountDirectory for PgAccounts {
    async fn standing(&self, id: Uuid) -> anyhow::Result<Option<Standing>> {
        let row = sqlx::query_as::<_, Standing>("SELECT user_type, status FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }
}

#[derive(Default)]
pub struct MemoryAccounts {
    accounts: Mutex<HashMap<Uuid, Standing>>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: Uuid, role: Role, status: UserStatus) {
        self.accounts
            .lock()
            .await
            .insert(id, Standing { role, status });
    }

    pub async fn remove(&self, id: Uuid) {
        self.accounts.lock().await.remove(&id);
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccounts {
    async fn standing(&self, id: Uuid) -> anyhow::Result<Option<Standing>> {
        Ok(self.accounts.lock().await.get(&id).copied())
    }
}

/// Sign-in and request rejection for accounts that are not active.
pub(crate) fn ensure_active(status: UserStatus) -> Result<(), ApiError> {
    match status {
        UserStatus::Active => Ok(()),
        UserStatus::Suspended => Err(ApiError::Forbidden("Account is suspended".into())),
        UserStatus::Inactive => Err(ApiError::Forbidden("Account is inactive".into())),
    }
}
