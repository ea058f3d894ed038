//! Borrow / return / renewal rules and due-date classification.
//!
//! Everything here is pure: stores load rows, apply these rules and persist
//! the result inside their own atomic section.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Date, Duration};

use super::repo_types::BorrowRecord;

pub const DEFAULT_DUE_SOON_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Borrowed,
}

/// A lifecycle precondition that does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("no copies of this book are available")]
    Unavailable,

    #[error("you already have an active borrow for this book")]
    AlreadyBorrowed,

    #[error("this book has already been returned")]
    AlreadyReturned,

    #[error("renewal limit reached ({max} renewals allowed)")]
    RenewalLimit { max: i32 },

    #[error("invalid copy pool: {quantity} on shelf of {total_copies}")]
    InvalidPool { quantity: i32, total_copies: i32 },
}

/// Loan terms taken from the settings row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanTerms {
    pub borrow_days: i32,
    pub max_renewals: i32,
}

impl Default for LoanTerms {
    fn default() -> Self {
        Self {
            borrow_days: 14,
            max_renewals: 2,
        }
    }
}

/// `quantity` on shelf out of `total_copies`; always `0 <= quantity <= total_copies`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPool {
    quantity: i32,
    total_copies: i32,
}

impl CopyPool {
    pub fn new(quantity: i32, total_copies: i32) -> Result<Self, RuleError> {
        if quantity < 0 || total_copies < 0 || quantity > total_copies {
            return Err(RuleError::InvalidPool {
                quantity,
                total_copies,
            });
        }
        Ok(Self {
            quantity,
            total_copies,
        })
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }

    pub fn total_copies(&self) -> i32 {
        self.total_copies
    }

    pub fn availability(&self) -> Availability {
        if self.quantity > 0 {
            Availability::Available
        } else {
            Availability::Borrowed
        }
    }

    pub fn check_out(self) -> Result<Self, RuleError> {
        if self.quantity == 0 {
            return Err(RuleError::Unavailable);
        }
        Ok(Self {
            quantity: self.quantity - 1,
            ..self
        })
    }

    /// Puts a copy back on the shelf. Returns `false` when the pool was already
    /// full and the count was left unchanged.
    pub fn check_in(self) -> (Self, bool) {
        if self.quantity >= self.total_copies {
            return (self, false);
        }
        (
            Self {
                quantity: self.quantity + 1,
                ..self
            },
            true,
        )
    }
}

pub fn due_date_from(start: Date, days: i32) -> Date {
    start.saturating_add(Duration::days(i64::from(days)))
}

/// Dates of a borrow that passed every precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewBorrow {
    pub borrowed_date: Date,
    pub due_date: Date,
}

/// Checks the borrow preconditions and takes one copy out of the pool.
pub fn plan_borrow(
    pool: CopyPool,
    stored: Availability,
    has_active_borrow: bool,
    terms: &LoanTerms,
    today: Date,
) -> Result<(CopyPool, NewBorrow), RuleError> {
    if has_active_borrow {
        return Err(RuleError::AlreadyBorrowed);
    }
    if stored != Availability::Available {
        return Err(RuleError::Unavailable);
    }
    let pool = pool.check_out()?;
    Ok((
        pool,
        NewBorrow {
            borrowed_date: today,
            due_date: due_date_from(today, terms.borrow_days),
        },
    ))
}

/// Marks the record returned and puts its copy back.
pub fn apply_return(
    record: &mut BorrowRecord,
    pool: CopyPool,
    today: Date,
) -> Result<(CopyPool, bool), RuleError> {
    if record.is_returned {
        return Err(RuleError::AlreadyReturned);
    }
    record.is_returned = true;
    record.return_date = Some(today);
    Ok(pool.check_in())
}

pub fn apply_renewal(record: &mut BorrowRecord, terms: &LoanTerms) -> Result<(), RuleError> {
    if record.is_returned {
        return Err(RuleError::AlreadyReturned);
    }
    if record.renewal_count >= terms.max_renewals {
        return Err(RuleError::RenewalLimit {
            max: terms.max_renewals,
        });
    }
    record.due_date = due_date_from(record.due_date, terms.borrow_days);
    record.renewal_count += 1;
    Ok(())
}

pub trait HasDueDate {
    fn due_date(&self) -> Date;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DueStatus {
    Overdue { days_overdue: i64 },
    DueToday,
    DueSoon { days_left: i64 },
    Active { days_left: i64 },
}

pub fn due_status(today: Date, due_date: Date, due_soon_days: i64) -> DueStatus {
    let days_left = (due_date - today).whole_days();
    match days_left {
        d if d < 0 => DueStatus::Overdue { days_overdue: -d },
        0 => DueStatus::DueToday,
        d if d <= due_soon_days => DueStatus::DueSoon { days_left: d },
        d => DueStatus::Active { days_left: d },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdueItem<T> {
    #[serde(flatten)]
    pub item: T,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueSoonItem<T> {
    #[serde(flatten)]
    pub item: T,
    pub days_left: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification<T> {
    pub overdue: Vec<OverdueItem<T>>,
    pub due_today: Vec<T>,
    pub due_soon: Vec<DueSoonItem<T>>,
    pub active: Vec<T>,
}

impl<T> Classification<T> {
    pub fn total_notifications(&self) -> usize {
        self.overdue.len() + self.due_today.len() + self.due_soon.len()
    }
}

/// Partitions active records by due date relative to `today`; each bucket is
/// ordered by due date.
pub fn classify<T, I>(today: Date, due_soon_days: i64, items: I) -> Classification<T>
where
    T: HasDueDate,
    I: IntoIterator<Item = T>,
{
    let mut items: Vec<T> = items.into_iter().collect();
    items.sort_by_key(|i| i.due_date());

    let mut out = Classification {
        overdue: Vec::new(),
        due_today: Vec::new(),
        due_soon: Vec::new(),
        active: Vec::new(),
    };
    for item in items {
        match due_status(today, item.due_date(), due_soon_days) {
            DueStatus::Overdue { days_overdue } => {
                out.overdue.push(OverdueItem { item, days_overdue })
            }
            DueStatus::DueToday => out.due_today.push(item),
            DueStatus::DueSoon { days_left } => out.due_soon.push(DueSoonItem { item, days_left }),
            DueStatus::Active { .. } => out.active.push(item),
        }
    }
    out
}
