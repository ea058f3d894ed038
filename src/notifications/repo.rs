use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::Date;
use uuid::Uuid;

use crate::lending::rules::HasDueDate;

/// An active borrow joined with the borrower's contact details.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReminderTarget {
    pub record_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub book_title: String,
    pub due_date: Date,
}

impl HasDueDate for ReminderTarget {
    fn due_date(&self) -> Date {
        self.due_date
    }
}

impl ReminderTarget {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

const TARGET_SELECT: &str = r#"
    SELECT r.id AS record_id, u.id AS user_id, u.username, u.email, u.first_name, u.last_name,
           b.title AS book_title, r.due_date
      FROM borrow_record r
      JOIN users u ON u.id = r.user_id
      JOIN book b ON b.id = r.book_id
"#;

/// Every active record with its borrower, ordered by due date.
pub async fn active_targets(db: &PgPool) -> Result<Vec<ReminderTarget>, sqlx::Error> {
    sqlx::query_as::<_, ReminderTarget>(&format!(
        "{TARGET_SELECT} WHERE NOT r.is_returned ORDER BY r.due_date, u.username"
    ))
    .fetch_all(db)
    .await
}
