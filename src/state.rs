use crate::auth::accounts::{AccountDirectory, MemoryAccounts, PgAccounts};
use crate::config::AppConfig;
use crate::isbn::services::{CannedMetadataClient, GoogleBooksClient, MetadataClient};
use crate::lending::{memory::MemoryLendingStore, repo::PgLendingStore, LendingStore};
use crate::mailer::{self, Mailer, RecordingMailer};
use crate::settings::{MemorySettingsStore, PgSettingsStore, SettingsStore};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub settings: Arc<dyn SettingsStore>,
    pub lending: Arc<dyn LendingStore>,
    pub mailer: Arc<dyn Mailer>,
    pub metadata: Arc<dyn MetadataClient>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = crate::db::connect(&config).await?;

        let accounts = Arc::new(PgAccounts::new(db.clone())) as Arc<dyn AccountDirectory>;
        let settings = Arc::new(PgSettingsStore::new(db.clone())) as Arc<dyn SettingsStore>;
        let lending = Arc::new(PgLendingStore::new(db.clone())) as Arc<dyn LendingStore>;
        let mailer = mailer::from_config(&config.mail)?;
        let metadata =
            Arc::new(GoogleBooksClient::new(&config.books_api)?) as Arc<dyn MetadataClient>;

        Ok(Self {
            db,
            config,
            accounts,
            settings,
            lending,
            mailer,
            metadata,
        })
    }

    /// State for tests: lazy pool that never connects, in-memory accounts,
    /// settings and lending, recording mailer and canned metadata.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig::for_tests());
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy(&config.database_url)
            .expect("lazy pool ok");

        Self {
            db,
            config,
            accounts: Arc::new(MemoryAccounts::new()),
            settings: Arc::new(MemorySettingsStore::new()),
            lending: Arc::new(MemoryLendingStore::new()),
            mailer: Arc::new(RecordingMailer::new()),
            metadata: Arc::new(CannedMetadataClient::new()),
        }
    }
}
