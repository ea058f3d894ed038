//! In-process lending store used by `AppState::fake()` and the lifecycle tests.

use std::collections::HashMap;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repo_types::{BookStock, BorrowRecord, Loan};
use super::rules::{self, Availability, CopyPool, LoanTerms};
use super::LendingError;
use super::store::{Actor, LendingStore, LoanFilter};

#[derive(Default)]
struct Inner {
    books: HashMap<Uuid, BookStock>,
    records: Vec<BorrowRecord>,
}

#[derive(Default)]
pub struct MemoryLendingStore {
    inner: Mutex<Inner>,
}

impl MemoryLendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_book(&self, title: &str, copies: i32) -> Uuid {
        let id = Uuid::new_v4();
        let stock = BookStock {
            id,
            title: title.to_string(),
            quantity: copies,
            total_copies: copies,
            availability: if copies > 0 {
                Availability::Available
            } else {
                Availability::Borrowed
            },
        };
        self.inner.lock().await.books.insert(id, stock);
        id
    }

    pub async fn stock(&self, book_id: Uuid) -> Option<BookStock> {
        self.inner.lock().await.books.get(&book_id).cloned()
    }

    pub async fn record_count(&self) -> usize {
        self.inner.lock().await.records.len()
    }
}

fn to_loan(inner: &Inner, r: &BorrowRecord) -> Loan {
    Loan {
        record: r.clone(),
        book_title: inner
            .books
            .get(&r.book_id)
            .map(|b| b.title.clone())
            .unwrap_or_default(),
    }
}

fn store_pool(stock: &mut BookStock, pool: CopyPool) {
    stock.quantity = pool.quantity();
    stock.availability = pool.availability();
}

#[async_trait]
impl LendingStore for MemoryLendingStore {
    async fn borrow(
        &self,
        patron: Uuid,
        book_id: Uuid,
        terms: &LoanTerms,
        today: Date,
    ) -> Result<BorrowRecord, LendingError> {
        let mut inner = self.inner.lock().await;
        let has_active = inner
            .records
            .iter()
            .any(|r| r.user_id == patron && r.book_id == book_id && !r.is_returned);
        let stock = inner
            .books
            .get_mut(&book_id)
            .ok_or(LendingError::BookNotFound)?;

        let pool = CopyPool::new(stock.quantity, stock.total_copies)?;
        let (pool, new) = rules::plan_borrow(pool, stock.availability, has_active, terms, today)?;
        store_pool(stock, pool);

        let now = OffsetDateTime::now_utc();
        let record = BorrowRecord {
            id: Uuid::new_v4(),
            user_id: patron,
            book_id,
            borrowed_date: new.borrowed_date,
            due_date: new.due_date,
            return_date: None,
            is_returned: false,
            renewal_count: 0,
            created_at: now,
            updated_at: now,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn return_book(
        &self,
        record_id: Uuid,
        actor: Actor,
        today: Date,
    ) -> Result<BorrowRecord, LendingError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let idx = inner
            .records
            .iter()
            .position(|r| r.id == record_id && actor.may_touch(r))
            .ok_or(LendingError::RecordNotFound)?;

        let mut record = inner.records[idx].clone();
        let stock = inner
            .books
            .get_mut(&record.book_id)
            .ok_or(LendingError::BookNotFound)?;
        let pool = CopyPool::new(stock.quantity, stock.total_copies)?;
        let (pool, _) = rules::apply_return(&mut record, pool, today)?;
        store_pool(stock, pool);

        record.updated_at = OffsetDateTime::now_utc();
        inner.records[idx] = record.clone();
        Ok(record)
    }

    async fn renew(
        &self,
        record_id: Uuid,
        patron: Uuid,
        terms: &LoanTerms,
    ) -> Result<BorrowRecord, LendingError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == record_id && r.user_id == patron)
            .ok_or(LendingError::RecordNotFound)?;

        let mut updated = record.clone();
        rules::apply_renewal(&mut updated, terms)?;
        updated.updated_at = OffsetDateTime::now_utc();
        *record = updated.clone();
        Ok(updated)
    }

    async fn loans_for_patron(
        &self,
        patron: Uuid,
        filter: LoanFilter,
    ) -> Result<Vec<Loan>, LendingError> {
        let inner = self.inner.lock().await;
        let mut loans: Vec<Loan> = inner
            .records
            .iter()
            .filter(|r| r.user_id == patron && filter.matches(r))
            .map(|r| to_loan(&inner, r))
            .collect();
        loans.sort_by_key(|l| l.record.due_date);
        Ok(loans)
    }

    async fn all_loans(
        &self,
        filter: LoanFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Loan>, i64), LendingError> {
        let inner = self.inner.lock().await;
        let mut loans: Vec<Loan> = inner
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| to_loan(&inner, r))
            .collect();
        loans.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        let total = loans.len() as i64;
        let page = loans
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::lending::rules::RuleError;
    use time::macros::date;

    const TODAY: Date = date!(2024 - 05 - 01);

    fn terms() -> LoanTerms {
        LoanTerms {
            borrow_days: 14,
            max_renewals: 2,
        }
    }

    #[tokio::test]
    async fn borrow_then_return_restores_pool() {
        let store = MemoryLendingStore::new();
        let book = store.add_book("Dune", 1).await;
        let patron = Uuid::new_v4();

        let rec = store.borrow(patron, book, &terms(), TODAY).await.unwrap();
        assert_eq!(rec.due_date, date!(2024 - 05 - 15));
        let s = store.stock(book).await.unwrap();
        assert_eq!((s.quantity, s.availability), (0, Availability::Borrowed));

        store
            .return_book(rec.id, Actor::Patron(patron), TODAY)
            .await
            .unwrap();
        let s = store.stock(book).await.unwrap();
        assert_eq!((s.quantity, s.availability), (1, Availability::Available));
    }

    #[tokio::test]
    async fn unknown_book_is_not_found() {
        let store = MemoryLendingStore::new();
        let err = store
            .borrow(Uuid::new_v4(), Uuid::new_v4(), &terms(), TODAY)
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::BookNotFound));
    }

    #[tokio::test]
    async fn empty_pool_creates_no_record() {
        let store = MemoryLendingStore::new();
        let book = store.add_book("Solaris", 1).await;
        store
            .borrow(Uuid::new_v4(), book, &terms(), TODAY)
            .await
            .unwrap();

        let err = store
            .borrow(Uuid::new_v4(), book, &terms(), TODAY)
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::Rule(RuleError::Unavailable)));
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn same_patron_cannot_hold_two_copies() {
        let store = MemoryLendingStore::new();
        let book = store.add_book("Emma", 3).await;
        let patron = Uuid::new_v4();
        store.borrow(patron, book, &terms(), TODAY).await.unwrap();
        let err = store
            .borrow(patron, book, &terms(), TODAY)
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::Rule(RuleError::AlreadyBorrowed)));
        assert_eq!(store.stock(book).await.unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn double_return_does_not_double_increment() {
        let store = MemoryLendingStore::new();
        let book = store.add_book("Ulysses", 2).await;
        let patron = Uuid::new_v4();
        let rec = store.borrow(patron, book, &terms(), TODAY).await.unwrap();

        store
            .return_book(rec.id, Actor::Librarian, TODAY)
            .await
            .unwrap();
        let err = store
            .return_book(rec.id, Actor::Librarian, TODAY)
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::Rule(RuleError::AlreadyReturned)));
        assert_eq!(store.stock(book).await.unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn patrons_cannot_return_or_renew_others_records() {
        let store = MemoryLendingStore::new();
        let book = store.add_book("Beloved", 2).await;
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let rec = store.borrow(owner, book, &terms(), TODAY).await.unwrap();

        assert!(matches!(
            store
                .return_book(rec.id, Actor::Patron(stranger), TODAY)
                .await,
            Err(LendingError::RecordNotFound)
        ));
        assert!(matches!(
            store.renew(rec.id, stranger, &terms()).await,
            Err(LendingError::RecordNotFound)
        ));
    }

    #[tokio::test]
    async fn renewal_limit_is_enforced() {
        let store = MemoryLendingStore::new();
        let book = store.add_book("Middlemarch", 1).await;
        let patron = Uuid::new_v4();
        let rec = store.borrow(patron, book, &terms(), TODAY).await.unwrap();

        for n in 1..=terms().max_renewals {
            let r = store.renew(rec.id, patron, &terms()).await.unwrap();
            assert_eq!(r.renewal_count, n);
        }
        let err = store.renew(rec.id, patron, &terms()).await.unwrap_err();
        assert!(matches!(err, LendingError::Rule(RuleError::RenewalLimit { max: 2 })));

        let loans = store
            .loans_for_patron(patron, LoanFilter::Active)
            .await
            .unwrap();
        assert_eq!(loans[0].record.due_date, date!(2024 - 06 - 12));
        assert_eq!(loans[0].book_title, "Middlemarch");
    }

    #[tokio::test]
    async fn concurrent_borrows_of_last_copy_have_one_winner() {
        let store = Arc::new(MemoryLendingStore::new());
        let book = store.add_book("The Last Copy", 1).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.borrow(Uuid::new_v4(), book, &terms(), TODAY).await
            }));
        }

        let mut ok = 0;
        let mut unavailable = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LendingError::Rule(RuleError::Unavailable)) => unavailable += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, unavailable), (1, 1));
        assert_eq!(store.stock(book).await.unwrap().quantity, 0);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn pool_invariant_holds_over_mixed_sequences() {
        let store = Arc::new(MemoryLendingStore::new());
        let book = store.add_book("Busy Book", 3).await;

        let mut handles = Vec::new();
        for i in 0..12 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let patron = Uuid::new_v4();
                if let Ok(rec) = store.borrow(patron, book, &terms(), TODAY).await {
                    if i % 2 == 0 {
                        let _ = store.return_book(rec.id, Actor::Patron(patron), TODAY).await;
                        let _ = store.return_book(rec.id, Actor::Patron(patron), TODAY).await;
                    }
                }
                let s = store.stock(book).await.unwrap();
                assert!(s.quantity >= 0 && s.quantity <= s.total_copies);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let s = store.stock(book).await.unwrap();
        let active = store
            .all_loans(LoanFilter::Active, 100, 0)
            .await
            .unwrap()
            .1;
        assert_eq!(i64::from(s.total_copies - s.quantity), active);
        assert_eq!(s.availability == Availability::Available, s.quantity > 0);
    }
}
