use crate::error::ApiError;
use crate::state::AppState;
use axum::Router;
use thiserror::Error;

mod dto;
pub mod handlers;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod rules;
pub mod store;

pub use rules::RuleError;
pub use store::{Actor, LendingStore, LoanFilter};

/// Failure of a lending store operation.
#[derive(Debug, Error)]
pub enum LendingError {
    #[error("book not found")]
    BookNotFound,

    #[error("borrow record not found")]
    RecordNotFound,

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<LendingError> for ApiError {
    fn from(e: LendingError) -> Self {
        match e {
            LendingError::BookNotFound | LendingError::RecordNotFound => {
                ApiError::NotFound(e.to_string())
            }
            LendingError::Rule(rule @ RuleError::InvalidPool { .. }) => {
                ApiError::Internal(anyhow::anyhow!(rule))
            }
            LendingError::Rule(rule) => ApiError::Conflict(rule.to_string()),
            LendingError::Database(db) => ApiError::Database(db),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::patron_routes())
        .merge(handlers::admin_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn lifecycle_errors_map_to_statuses() {
        assert_eq!(ApiError::from(LendingError::BookNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(LendingError::RecordNotFound).status(), StatusCode::NOT_FOUND);
        for rule in [
            RuleError::Unavailable,
            RuleError::AlreadyBorrowed,
            RuleError::AlreadyReturned,
            RuleError::RenewalLimit { max: 2 },
        ] {
            assert_eq!(ApiError::from(LendingError::from(rule)).status(), StatusCode::CONFLICT);
        }
        assert_eq!(
            ApiError::from(LendingError::from(RuleError::InvalidPool {
                quantity: 3,
                total_copies: 1
            }))
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rule_message_passes_through() {
        let err = LendingError::from(RuleError::RenewalLimit { max: 2 });
        assert_eq!(err.to_string(), RuleError::RenewalLimit { max: 2 }.to_string());
    }
}
