use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::Date;
use tracing::{debug, warn};
use uuid::Uuid;

use super::repo_types::{BookStock, BorrowRecord, Loan};
use super::rules::{self, CopyPool, LoanTerms};
use super::LendingError;
use super::store::{Actor, LendingStore, LoanFilter};

const RECORD_COLUMNS: &str = "id, user_id, book_id, borrowed_date, due_date, return_date, \
                              is_returned, renewal_count, created_at, updated_at";

/// Postgres-backed lending store. Every mutation runs in one transaction that
/// holds row locks on the touched book and record.
#[derive(Clone)]
pub struct PgLendingStore {
    db: PgPool,
}

impl PgLendingStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

async fn lock_book(
    tx: &mut Transaction<'_, Postgres>,
    book_id: Uuid,
) -> Result<Option<BookStock>, sqlx::Error> {
    sqlx::query_as::<_, BookStock>(
        r#"
        SELECT id, title, quantity, total_copies, availability
          FROM book
         WHERE id = $1
         FOR UPDATE
        "#,
    )
    .bind(book_id)
    .fetch_optional(&mut **tx)
    .await
}

async fn store_pool(
    tx: &mut Transaction<'_, Postgres>,
    book_id: Uuid,
    pool: CopyPool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE book
           SET quantity = $2, availability = $3, updated_at = now()
         WHERE id = $1
        "#,
    )
    .bind(book_id)
    .bind(pool.quantity())
    .bind(pool.availability())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn lock_record(
    tx: &mut Transaction<'_, Postgres>,
    record_id: Uuid,
) -> Result<Option<BorrowRecord>, sqlx::Error> {
    sqlx::query_as::<_, BorrowRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM borrow_record WHERE id = $1 FOR UPDATE"
    ))
    .bind(record_id)
    .fetch_optional(&mut **tx)
    .await
}

/// `date_param` is the placeholder index bound to `LoanFilter::cutoff`.
fn filter_clause(filter: LoanFilter, date_param: usize) -> String {
    match filter {
        LoanFilter::Active => "NOT r.is_returned".into(),
        LoanFilter::Returned => "r.is_returned".into(),
        LoanFilter::Overdue(_) => format!("NOT r.is_returned AND r.due_date < ${date_param}"),
        LoanFilter::All => "TRUE".into(),
    }
}

#[async_trait]
impl LendingStore for PgLendingStore {
    async fn borrow(
        &self,
        patron: Uuid,
        book_id: Uuid,
        terms: &LoanTerms,
        today: Date,
    ) -> Result<BorrowRecord, LendingError> {
        let mut tx = self.db.begin().await?;

        let stock = lock_book(&mut tx, book_id)
            .await?
            .ok_or(LendingError::BookNotFound)?;

        let has_active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM borrow_record
                 WHERE user_id = $1 AND book_id = $2 AND NOT is_returned
            )
            "#,
        )
        .bind(patron)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        let pool = CopyPool::new(stock.quantity, stock.total_copies)?;
        let (pool, new) = rules::plan_borrow(pool, stock.availability, has_active, terms, today)?;
        store_pool(&mut tx, book_id, pool).await?;

        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            r#"
            INSERT INTO borrow_record (user_id, book_id, borrowed_date, due_date)
            VALUES ($1, $2, $3, $4)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(patron)
        .bind(book_id)
        .bind(new.borrowed_date)
        .bind(new.due_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(%patron, %book_id, quantity = pool.quantity(), "book borrowed");
        Ok(record)
    }

    async fn return_book(
        &self,
        record_id: Uuid,
        actor: Actor,
        today: Date,
    ) -> Result<BorrowRecord, LendingError> {
        let mut tx = self.db.begin().await?;

        let mut record = lock_record(&mut tx, record_id)
            .await?
            .filter(|r| actor.may_touch(r))
            .ok_or(LendingError::RecordNotFound)?;
        let stock = lock_book(&mut tx, record.book_id)
            .await?
            .ok_or(LendingError::BookNotFound)?;

        let pool = CopyPool::new(stock.quantity, stock.total_copies)?;
        let (pool, restored) = rules::apply_return(&mut record, pool, today)?;
        if !restored {
            warn!(%record_id, book_id = %stock.id, "return into a full copy pool; quantity unchanged");
        }
        store_pool(&mut tx, stock.id, pool).await?;

        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            r#"
            UPDATE borrow_record
               SET is_returned = TRUE, return_date = $2, updated_at = now()
             WHERE id = $1
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(record_id)
        .bind(record.return_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(%record_id, quantity = pool.quantity(), "book returned");
        Ok(record)
    }

    async fn renew(
        &self,
        record_id: Uuid,
        patron: Uuid,
        terms: &LoanTerms,
    ) -> Result<BorrowRecord, LendingError> {
        let mut tx = self.db.begin().await?;

        let mut record = lock_record(&mut tx, record_id)
            .await?
            .filter(|r| r.user_id == patron)
            .ok_or(LendingError::RecordNotFound)?;
        rules::apply_renewal(&mut record, terms)?;

        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            r#"
            UPDATE borrow_record
               SET due_date = $2, renewal_count = $3, updated_at = now()
             WHERE id = $1
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(record_id)
        .bind(record.due_date)
        .bind(record.renewal_count)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(%record_id, renewal_count = record.renewal_count, "loan renewed");
        Ok(record)
    }

    async fn loans_for_patron(
        &self,
        patron: Uuid,
        filter: LoanFilter,
    ) -> Result<Vec<Loan>, LendingError> {
        let sql = format!(
            r#"
            SELECT r.id, r.user_id, r.book_id, r.borrowed_date, r.due_date, r.return_date,
                   r.is_returned, r.renewal_count, r.created_at, r.updated_at,
                   b.title AS book_title
              FROM borrow_record r
              JOIN book b ON b.id = r.book_id
             WHERE r.user_id = $1 AND {}
             ORDER BY r.due_date ASC
            "#,
            filter_clause(filter, 2)
        );
        let mut query = sqlx::query_as::<_, Loan>(&sql).bind(patron);
        if let Some(day) = filter.cutoff() {
            query = query.bind(day);
        }
        let rows = query.fetch_all(&self.db).await?;
        Ok(rows)
    }

    async fn all_loans(
        &self,
        filter: LoanFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Loan>, i64), LendingError> {
        let sql = format!(
            r#"
            SELECT r.id, r.user_id, r.book_id, r.borrowed_date, r.due_date, r.return_date,
                   r.is_returned, r.renewal_count, r.created_at, r.updated_at,
                   b.title AS book_title
              FROM borrow_record r
              JOIN book b ON b.id = r.book_id
             WHERE {}
             ORDER BY r.created_at DESC
             LIMIT $1 OFFSET $2
            "#,
            filter_clause(filter, 3)
        );
        let mut query = sqlx::query_as::<_, Loan>(&sql).bind(limit).bind(offset);
        if let Some(day) = filter.cutoff() {
            query = query.bind(day);
        }
        let rows = query.fetch_all(&self.db).await?;

        let count_sql = format!(
            "SELECT COUNT(*) FROM borrow_record r WHERE {}",
            filter_clause(filter, 1)
        );
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(day) = filter.cutoff() {
            count = count.bind(day);
        }
        let total = count.fetch_one(&self.db).await?;

        Ok((rows, total))
    }
}
