use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::lending::rules::{LoanTerms, DEFAULT_DUE_SOON_DAYS};

/// Singleton library settings row (`id = 1`).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppSettings {
    pub library_name: String,
    pub email_notifications: bool,
    pub default_borrow_days: i32,
    pub max_renewals: i32,
    pub due_soon_days: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let terms = LoanTerms::default();
        Self {
            library_name: "ShelfSmart Library".into(),
            email_notifications: true,
            default_borrow_days: terms.borrow_days,
            max_renewals: terms.max_renewals,
            due_soon_days: DEFAULT_DUE_SOON_DAYS as i32,
            updated_at: None,
        }
    }
}

impl AppSettings {
    pub fn loan_terms(&self) -> LoanTerms {
        LoanTerms {
            borrow_days: self.default_borrow_days,
            max_renewals: self.max_renewals,
        }
    }

    pub fn due_soon_window(&self) -> i64 {
        i64::from(self.due_soon_days)
    }
}

/// Reads the settings row, falling back to defaults when it has not been created.
pub async fn get(db: &PgPool) -> anyhow::Result<AppSettings> {
    let row = sqlx::query_as::<_, AppSettings>(
        r#"
        SELECT library_name, email_notifications, default_borrow_days, max_renewals,
               due_soon_days, updated_at
          FROM app_settings
         WHERE id = 1
        "#,
    )
    .fetch_optional(db)
    .await?;
    Ok(row.unwrap_or_default())
}

pub async fn upsert(db: &PgPool, s: &AppSettings) -> anyhow::Result<AppSettings> {
    let row = sqlx::query_as::<_, AppSettings>(
        r#"
        INSERT INTO app_settings (id, library_name, email_notifications, default_borrow_days,
                                  max_renewals, due_soon_days)
        VALUES (1, $1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
           SET library_name = EXCLUDED.library_name,
               email_notifications = EXCLUDED.email_notifications,
               default_borrow_days = EXCLUDED.default_borrow_days,
               max_renewals = EXCLUDED.max_renewals,
               due_soon_days = EXCLUDED.due_soon_days,
               updated_at = now()
        RETURNING library_name, email_notifications, default_borrow_days, max_renewals,
                  due_soon_days, updated_at
        "#,
    )
    .bind(&s.library_name)
    .bind(s.email_notifications)
    .bind(s.default_borrow_days)
    .bind(s.max_renewals)
    .bind(s.due_soon_days)
    .fetch_one(db)
    .await?;
    Ok(row)
}
