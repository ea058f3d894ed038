use std::cmp::Reverse;

use serde::Serialize;
use time::Date;
use uuid::Uuid;

use super::repo::OverdueRow;
use crate::lending::{
    repo_types::Loan,
    rules::{classify, OverdueItem},
};

pub const DEFAULT_PER_PAGE: usize = 3;
pub const RECENT_ACTIVITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Returned,
    Overdue,
    Active,
}

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub record_id: Uuid,
    pub book_id: Uuid,
    pub book_title: String,
    pub borrowed_date: Date,
    pub due_date: Date,
    pub return_date: Option<Date>,
    pub status: ActivityStatus,
}

impl Activity {
    fn new(loan: Loan, status: ActivityStatus) -> Self {
        Self {
            record_id: loan.record.id,
            book_id: loan.record.book_id,
            book_title: loan.book_title,
            borrowed_date: loan.record.borrowed_date,
            due_date: loan.record.due_date,
            return_date: loan.record.return_date,
            status,
        }
    }
}

/// A patron's own borrowing summary.
#[derive(Debug, Clone, Serialize)]
pub struct PatronDashboard {
    pub total_borrowed: usize,
    pub total_returned: usize,
    pub total_overdue: usize,
    pub recent_activity: Vec<Activity>,
}

/// Summarizes every record of one patron as of `today`.
pub fn patron_dashboard(today: Date, loans: Vec<Loan>) -> PatronDashboard {
    let (returned, active): (Vec<_>, Vec<_>) =
        loans.into_iter().partition(|l| l.record.is_returned);
    let total_returned = returned.len();
    let total_borrowed = active.len();

    let c = classify(today, 0, active);
    let total_overdue = c.overdue.len();

    let mut recent: Vec<(Loan, ActivityStatus)> = returned
        .into_iter()
        .map(|l| (l, ActivityStatus::Returned))
        .chain(c.overdue.into_iter().map(|o| (o.item, ActivityStatus::Overdue)))
        .chain(c.due_today.into_iter().map(|l| (l, ActivityStatus::Active)))
        .chain(c.due_soon.into_iter().map(|d| (d.item, ActivityStatus::Active)))
        .chain(c.active.into_iter().map(|l| (l, ActivityStatus::Active)))
        .collect();
    recent.sort_by_key(|(l, _)| Reverse((l.record.borrowed_date, l.record.created_at)));
    recent.truncate(RECENT_ACTIVITY);

    PatronDashboard {
        total_borrowed,
        total_returned,
        total_overdue,
        recent_activity: recent
            .into_iter()
            .map(|(l, status)| Activity::new(l, status))
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueBorrower {
    pub name: String,
    pub username: String,
    pub book: String,
    pub due_date: Date,
    pub days_overdue: i64,
}

impl OverdueBorrower {
    fn from_item(OverdueItem { item: row, days_overdue }: OverdueItem<OverdueRow>) -> Self {
        let name = if row.full_name.is_empty() {
            row.username.clone()
        } else {
            row.full_name
        };
        Self {
            name,
            username: row.username,
            book: row.book_title,
            due_date: row.due_date,
            days_overdue,
        }
    }
}

/// Active rows past due on `today`, oldest due date first.
pub fn overdue_borrowers(today: Date, active: Vec<OverdueRow>) -> Vec<OverdueBorrower> {
    classify(today, 0, active)
        .overdue
        .into_iter()
        .map(OverdueBorrower::from_item)
        .collect()
}

/// Spreads `(month, count)` pairs over January..December; unknown months are ignored.
pub fn fill_months(counts: &[(i32, i64)]) -> [i64; 12] {
    let mut months = [0i64; 12];
    for &(month, n) in counts {
        if (1..=12).contains(&month) {
            months[(month - 1) as usize] += n;
        }
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lending::repo_types::BorrowRecord;
    use time::macros::date;

    fn loan(borrowed: Date, due: Date, returned: bool) -> Loan {
        let at = borrowed.midnight().assume_utc();
        Loan {
            record: BorrowRecord {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                book_id: Uuid::new_v4(),
                borrowed_date: borrowed,
                due_date: due,
                return_date: returned.then_some(due),
                is_returned: returned,
                renewal_count: 0,
                created_at: at,
                updated_at: at,
            },
            book_title: format!("Book of {borrowed}"),
        }
    }

    #[test]
    fn patron_counts_split_active_returned_and_overdue() {
        let today = date!(2024 - 03 - 20);
        let loans = vec![
            loan(date!(2024 - 03 - 01), date!(2024 - 03 - 15), false),
            loan(date!(2024 - 03 - 06), date!(2024 - 03 - 20), false),
            loan(date!(2024 - 03 - 10), date!(2024 - 03 - 24), false),
            loan(date!(2024 - 02 - 01), date!(2024 - 02 - 15), true),
        ];
        let d = patron_dashboard(today, loans);
        assert_eq!(d.total_borrowed, 3);
        assert_eq!(d.total_returned, 1);
        assert_eq!(d.total_overdue, 1);
    }

    #[test]
    fn recent_activity_is_newest_five_with_status() {
        let today = date!(2024 - 03 - 20);
        let mut loans: Vec<Loan> = (1..=5)
            .map(|day| {
                let borrowed = Date::from_calendar_date(2024, time::Month::February, day).unwrap();
                loan(borrowed, borrowed + time::Duration::days(14), true)
            })
            .collect();
        loans.push(loan(date!(2024 - 03 - 01), date!(2024 - 03 - 15), false));
        loans.push(loan(date!(2024 - 03 - 10), date!(2024 - 03 - 24), false));

        let d = patron_dashboard(today, loans);
        let recent = &d.recent_activity;
        assert_eq!(recent.len(), RECENT_ACTIVITY);
        assert_eq!(recent[0].borrowed_date, date!(2024 - 03 - 10));
        assert_eq!(recent[0].status, ActivityStatus::Active);
        assert_eq!(recent[1].status, ActivityStatus::Overdue);
        assert_eq!(recent[2].status, ActivityStatus::Returned);
        assert_eq!(recent[4].borrowed_date, date!(2024 - 02 - 03));
    }

    #[test]
    fn activity_status_serializes_lowercase() {
        let json = serde_json::to_value(ActivityStatus::Overdue).unwrap();
        assert_eq!(json, "overdue");
    }

    #[test]
    fn months_are_one_based_and_gaps_stay_zero() {
        let months = fill_months(&[(1, 4), (3, 2), (12, 7), (13, 9), (0, 1)]);
        assert_eq!(months, [4, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 7]);
    }

    fn row(username: &str, full_name: &str, due: Date) -> OverdueRow {
        OverdueRow {
            full_name: full_name.into(),
            username: username.into(),
            book_title: "Dune".into(),
            due_date: due,
        }
    }

    #[test]
    fn overdue_row_counts_days_and_falls_back_to_username() {
        let rows = vec![row("ada", "", date!(2024 - 03 - 01))];
        let b = &overdue_borrowers(date!(2024 - 03 - 11), rows)[0];
        assert_eq!(b.name, "ada");
        assert_eq!(b.days_overdue, 10);
    }

    #[test]
    fn only_records_due_before_today_are_overdue() {
        let today = date!(2024 - 03 - 11);
        let rows = vec![
            row("today", "Due Today", today),
            row("yesterday", "Due Yesterday", date!(2024 - 03 - 10)),
            row("later", "Due Later", date!(2024 - 03 - 20)),
        ];
        let overdue = overdue_borrowers(today, rows);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].name, "Due Yesterday");
        assert_eq!(overdue[0].days_overdue, 1);
    }
}
