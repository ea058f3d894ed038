use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Error type returned by every HTTP handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Expired(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("upstream timeout: {0}")]
    Timeout(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Expired(_) => StatusCode::GONE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Expired(_) => "EXPIRED",
            ApiError::Upstream(_) => "UPSTREAM",
            ApiError::Timeout(_) => "UPSTREAM_TIMEOUT",
            ApiError::Database(_) | ApiError::Internal(_) => "INTERNAL",
        }
    }

    /// Maps unique and foreign-key violations to `Conflict`, everything else to `Database`.
    pub fn from_db(e: sqlx::Error, conflict_msg: &str) -> Self {
        match db_error_code(&e).as_deref() {
            Some(UNIQUE_VIOLATION) => ApiError::Conflict(conflict_msg.to_string()),
            Some(FOREIGN_KEY_VIOLATION) => {
                ApiError::Conflict(format!("{conflict_msg}: still referenced"))
            }
            _ => ApiError::Database(e),
        }
    }
}

pub const UNIQUE_VIOLATION: &str = "23505";
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

pub fn db_error_code(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c.into_owned())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Database(e) => {
                error!(error = %e, "database error");
                "An internal server error occurred.".to_string()
            }
            ApiError::Internal(e) => {
                error!(error = ?e, "internal error");
                "An internal server error occurred.".to_string()
            }
            other => other.to_string(),
        };
        let body = ApiErrorResponse {
            error: ApiErrorBody {
                code: self.code(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Expired("x".into()).status(), StatusCode::GONE);
        assert_eq!(
            ApiError::Timeout("books".into()).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn non_database_errors_pass_through_from_db() {
        let err = ApiError::from_db(sqlx::Error::RowNotFound, "duplicate");
        assert!(matches!(err, ApiError::Database(sqlx::Error::RowNotFound)));
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let resp = ApiError::Internal(anyhow::anyhow!("secret detail")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("INTERNAL"));
        assert!(!text.contains("secret detail"));
    }
}
