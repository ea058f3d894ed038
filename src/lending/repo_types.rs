use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::rules::{Availability, HasDueDate};

/// Borrow record row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BorrowRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrowed_date: Date,
    pub due_date: Date,
    pub return_date: Option<Date>,
    pub is_returned: bool,
    pub renewal_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Copy-pool columns of a book, read under a row lock.
#[derive(Debug, Clone, FromRow)]
pub struct BookStock {
    pub id: Uuid,
    pub title: String,
    pub quantity: i32,
    pub total_copies: i32,
    pub availability: Availability,
}

/// Borrow record joined with the borrowed book's title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Loan {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: BorrowRecord,
    pub book_title: String,
}

impl HasDueDate for BorrowRecord {
    fn due_date(&self) -> Date {
        self.due_date
    }
}

impl HasDueDate for Loan {
    fn due_date(&self) -> Date {
        self.record.due_date
    }
}
