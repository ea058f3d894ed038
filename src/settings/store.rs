use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::repo::{self, AppSettings};

/// Source of the library-wide settings consulted by lending and notifications.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self) -> anyhow::Result<AppSettings>;

    async fn save(&self, settings: &AppSettings) -> anyhow::Result<AppSettings>;
}

#[derive(Clone)]
pub struct PgSettingsStore {
    db: PgPool,
}

impl PgSettingsStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn get(&self) -> anyhow::Result<AppSettings> {
        repo::get(&self.db).await
    }

    async fn save(&self, settings: &AppSettings) -> anyhow::Result<AppSettings> {
        repo::upsert(&self.db, settings).await
    }
}

/// Settings held in process; starts from the defaults.
#[derive(Default)]
pub struct MemorySettingsStore {
    current: Mutex<AppSettings>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self) -> anyhow::Result<AppSettings> {
        Ok(self.current.lock().await.clone())
    }

    async fn save(&self, settings: &AppSettings) -> anyhow::Result<AppSettings> {
        let mut saved = settings.clone();
        saved.updated_at = Some(OffsetDateTime::now_utc());
        *self.current.lock().await = saved.clone();
        Ok(saved)
    }
}
