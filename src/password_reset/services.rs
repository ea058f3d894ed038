use rand::{rngs::OsRng, Rng};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use super::dto::ResetRequested;
use super::repo::{self, OtpRecord};
use crate::{
    auth::{
        repo_types::User,
        services::{hash_password, MIN_PASSWORD_LEN},
    },
    error::{ApiError, ApiResult},
    mailer,
    state::AppState,
};

pub const OTP_CODE_LENGTH: usize = 6;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("Invalid OTP code")]
    Invalid,

    #[error("OTP code has expired")]
    Expired,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<OtpError> for ApiError {
    fn from(e: OtpError) -> Self {
        match e {
            OtpError::Invalid => ApiError::Validation(e.to_string()),
            OtpError::Expired => ApiError::Expired(e.to_string()),
            OtpError::Database(db) => ApiError::Database(db),
        }
    }
}

pub fn generate_code() -> String {
    let n: u32 = OsRng.gen_range(0..1_000_000);
    format!("{n:06}")
}

pub fn is_code_format(code: &str) -> bool {
    code.len() == OTP_CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// A missing code is `Invalid`; a code at or past `expires_at` is `Expired`.
pub fn evaluate(record: Option<OtpRecord>, now: OffsetDateTime) -> Result<OtpRecord, OtpError> {
    let record = record.ok_or(OtpError::Invalid)?;
    if now >= record.expires_at {
        return Err(OtpError::Expired);
    }
    Ok(record)
}

async fn find_user(state: &AppState, username: &str) -> ApiResult<User> {
    User::find_by_username(&state.db, username.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("No account found with that username"))
}

pub async fn request_reset(state: &AppState, username: &str) -> ApiResult<ResetRequested> {
    let user = find_user(state, username).await?;
    let ttl = state.config.otp_ttl_minutes;
    let code = generate_code();
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(ttl);

    let mut tx = state.db.begin().await?;
    let record = repo::issue(&mut tx, user.id, &code, expires_at).await?;
    tx.commit().await?;

    let message = mailer::password_reset_code(&user.email, &user.full_name(), &code, ttl);
    let email_sent = match state.mailer.send(&message).await {
        Ok(()) => true,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "password reset mail failed");
            false
        }
    };

    info!(user_id = %user.id, otp_id = %record.id, email_sent, "password reset code issued");
    Ok(ResetRequested {
        email_sent,
        expires_in_minutes: ttl,
        message: if email_sent {
            "A reset code has been sent to the email on file.".into()
        } else {
            "A reset code was issued but the email could not be delivered.".into()
        },
    })
}

pub async fn verify(state: &AppState, username: &str, code: &str) -> ApiResult<()> {
    let user = find_user(state, username).await?;
    if !is_code_format(code) {
        return Err(OtpError::Invalid.into());
    }
    let mut conn = state.db.acquire().await?;
    let found = repo::find_unused(&mut conn, user.id, code).await?;
    evaluate(found, OffsetDateTime::now_utc())?;
    Ok(())
}

/// Consumes the code and stores the new password hash in one transaction.
pub async fn confirm(
    state: &AppState,
    username: &str,
    code: &str,
    new_password: &str,
) -> ApiResult<()> {
    if new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("Password too short"));
    }
    let user = find_user(state, username).await?;
    if !is_code_format(code) {
        return Err(OtpError::Invalid.into());
    }
    let hash = hash_password(new_password)?;

    let mut tx = state.db.begin().await?;
    let found = repo::find_unused(&mut tx, user.id, code).await?;
    let record = evaluate(found, OffsetDateTime::now_utc())?;
    if !repo::consume(&mut tx, record.id).await? {
        return Err(OtpError::Invalid.into());
    }
    User::set_password(&mut tx, user.id, &hash).await?;
    tx.commit().await?;

    info!(user_id = %user.id, "password reset completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    fn issued_at(t: OffsetDateTime) -> OtpRecord {
        OtpRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            code: "042917".into(),
            created_at: t,
            expires_at: t + Duration::minutes(10),
            is_used: false,
        }
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert!(is_code_format(&code), "bad code {code}");
        }
    }

    #[test]
    fn code_format_rejects_non_digits() {
        assert!(!is_code_format("12345"));
        assert!(!is_code_format("12a456"));
        assert!(!is_code_format("1234567"));
    }

    #[test]
    fn missing_code_is_invalid() {
        let err = evaluate(None, datetime!(2024-05-01 12:00 UTC)).unwrap_err();
        assert!(matches!(err, OtpError::Invalid));
        assert_eq!(ApiError::from(err).status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn code_is_valid_inside_window() {
        let t = datetime!(2024-05-01 12:00 UTC);
        assert!(evaluate(Some(issued_at(t)), t + Duration::minutes(9)).is_ok());
    }

    #[test]
    fn code_checked_after_eleven_minutes_is_expired_not_invalid() {
        let t = datetime!(2024-05-01 12:00 UTC);
        let err = evaluate(Some(issued_at(t)), t + Duration::minutes(11)).unwrap_err();
        assert!(matches!(err, OtpError::Expired));
        assert_eq!(ApiError::from(err).status(), axum::http::StatusCode::GONE);
    }

    #[test]
    fn code_expires_exactly_at_deadline() {
        let t = datetime!(2024-05-01 12:00 UTC);
        let err = evaluate(Some(issued_at(t)), t + Duration::minutes(10)).unwrap_err();
        assert!(matches!(err, OtpError::Expired));
    }
}
