use async_trait::async_trait;
use time::Date;
use uuid::Uuid;

use super::repo_types::{BorrowRecord, Loan};
use super::rules::LoanTerms;
use super::LendingError;

/// Which records a listing should include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoanFilter {
    #[default]
    Active,
    Returned,
    /// Active and due strictly before the given day.
    Overdue(Date),
    All,
}

impl LoanFilter {
    pub fn matches(&self, r: &BorrowRecord) -> bool {
        match self {
            LoanFilter::Active => !r.is_returned,
            LoanFilter::Returned => r.is_returned,
            LoanFilter::Overdue(today) => !r.is_returned && r.due_date < *today,
            LoanFilter::All => true,
        }
    }

    pub(crate) fn cutoff(&self) -> Option<Date> {
        match self {
            LoanFilter::Overdue(today) => Some(*today),
            _ => None,
        }
    }
}

/// Who is acting on a borrow record. Patrons only see their own records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Patron(Uuid),
    Librarian,
}

impl Actor {
    pub fn may_touch(&self, record: &BorrowRecord) -> bool {
        match self {
            Actor::Patron(id) => record.user_id == *id,
            Actor::Librarian => true,
        }
    }
}

/// Atomic lifecycle operations over borrow records and the copy pool.
///
/// Each mutating call is all-or-nothing: a failure leaves both the record and
/// the book untouched.
#[async_trait]
pub trait LendingStore: Send + Sync {
    async fn borrow(
        &self,
        patron: Uuid,
        book_id: Uuid,
        terms: &LoanTerms,
        today: Date,
    ) -> Result<BorrowRecord, LendingError>;

    async fn return_book(
        &self,
        record_id: Uuid,
        actor: Actor,
        today: Date,
    ) -> Result<BorrowRecord, LendingError>;

    async fn renew(
        &self,
        record_id: Uuid,
        patron: Uuid,
        terms: &LoanTerms,
    ) -> Result<BorrowRecord, LendingError>;

    async fn loans_for_patron(
        &self,
        patron: Uuid,
        filter: LoanFilter,
    ) -> Result<Vec<Loan>, LendingError>;

    /// Every record matching `filter`, newest borrow first.
    async fn all_loans(
        &self,
        filter: LoanFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Loan>, i64), LendingError>;
}
