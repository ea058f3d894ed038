use serde::{Deserialize, Serialize};

use super::repo_types::Loan;
use super::rules::DueStatus;
use crate::pagination::Pagination;

#[derive(Debug, Default, Deserialize)]
pub struct MyBorrowsQuery {
    #[serde(default)]
    pub include_returned: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    Active,
    Overdue,
    Returned,
    All,
}

#[derive(Debug, Deserialize)]
pub struct AdminBorrowsQuery {
    #[serde(default)]
    pub status: StatusFilter,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AdminBorrowsQuery {
    pub fn page(&self) -> Pagination {
        Pagination::from_parts(self.limit, self.offset)
    }
}

/// A loan with its due-date standing; `due_status` is absent once returned.
#[derive(Debug, Serialize)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: Loan,
    pub due_status: Option<DueStatus>,
}
