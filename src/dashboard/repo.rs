use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::Date;

use crate::lending::rules::HasDueDate;

#[derive(Debug, Clone, Copy, Default, Serialize, FromRow)]
pub struct Totals {
    pub total_users: i64,
    pub total_books: i64,
    pub total_admins: i64,
    pub active_borrows: i64,
    pub returned_borrows: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OverdueRow {
    pub full_name: String,
    pub username: String,
    pub book_title: String,
    pub due_date: Date,
}

impl HasDueDate for OverdueRow {
    fn due_date(&self) -> Date {
        self.due_date
    }
}

pub async fn totals(db: &PgPool) -> Result<Totals, sqlx::Error> {
    sqlx::query_as::<_, Totals>(
        r#"
        SELECT (SELECT count(*) FROM users)                                     AS total_users,
               (SELECT count(*) FROM book)                                      AS total_books,
               (SELECT count(*) FROM users WHERE user_type = 'admin')           AS total_admins,
               (SELECT count(*) FROM borrow_record WHERE NOT is_returned)       AS active_borrows,
               (SELECT count(*) FROM borrow_record WHERE is_returned)           AS returned_borrows
        "#,
    )
    .fetch_one(db)
    .await
}

/// Borrower and title of every active record.
pub async fn active_rows(db: &PgPool) -> Result<Vec<OverdueRow>, sqlx::Error> {
    sqlx::query_as::<_, OverdueRow>(
        r#"
        SELECT trim(u.first_name || ' ' || u.last_name) AS full_name, u.username,
               b.title AS book_title, r.due_date
          FROM borrow_record r
          JOIN users u ON u.id = r.user_id
          JOIN book b ON b.id = r.book_id
         WHERE NOT r.is_returned
         ORDER BY r.due_date, u.username
        "#,
    )
    .fetch_all(db)
    .await
}

/// `(month, count)` pairs for records borrowed in `year`.
pub async fn borrowed_per_month(db: &PgPool, year: i32) -> Result<Vec<(i32, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (i32, i64)>(
        r#"
        SELECT extract(month FROM borrowed_date)::int AS month, count(*) AS n
          FROM borrow_record
         WHERE extract(year FROM borrowed_date)::int = $1
         GROUP BY 1
        "#,
    )
    .bind(year)
    .fetch_all(db)
    .await
}

/// `(month, count)` pairs for records returned in `year`.
pub async fn returned_per_month(db: &PgPool, year: i32) -> Result<Vec<(i32, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (i32, i64)>(
        r#"
        SELECT extract(month FROM return_date)::int AS month, count(*) AS n
          FROM borrow_record
         WHERE is_returned AND return_date IS NOT NULL
           AND extract(year FROM return_date)::int = $1
         GROUP BY 1
        "#,
    )
    .bind(year)
    .fetch_all(db)
    .await
}
