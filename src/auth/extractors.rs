use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::accounts::{ensure_active, Accounts};
use super::dto::{JwtKeys, TokenKind};
use super::repo_types::Role;
use crate::error::ApiError;

/// Authenticated caller from a valid access token. `role` is the account's
/// current role, not the one signed into the token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

/// Authenticated caller whose account currently holds the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    Accounts: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err(ApiError::Unauthorized("Invalid or expired token".into()));
            }
        };

        if claims.kind != TokenKind::Access {
            return Err(ApiError::Unauthorized("Access token required".into()));
        }

        let Accounts(accounts) = Accounts::from_ref(state);
        let standing = accounts
            .standing(claims.sub)
            .await
            .map_err(ApiError::Internal)?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token for missing account");
                ApiError::Unauthorized("Account no longer exists".into())
            })?;
        if let Err(e) = ensure_active(standing.status) {
            warn!(user_id = %claims.sub, status = ?standing.status, "inactive account rejected");
            return Err(e);
        }

        Ok(AuthUser {
            id: claims.sub,
            role: standing.role,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    Accounts: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            warn!(user_id = %user.id, "admin route denied");
            return Err(ApiError::Forbidden(
                "You don't have permission to access this resource.".into(),
            ));
        }
        Ok(AdminUser(user.id))
    }
}
