use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        accounts::ensure_active,
        dto::{
            AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest,
            UpdateProfileRequest,
        },
        extractors::AuthUser,
        repo::NewUser,
        repo_types::{Role, User},
        services::{
            hash_password, is_valid_email, is_valid_username, verify_password, JwtKeys,
            MIN_PASSWORD_LEN,
        },
    },
    catalog::services::single_line,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).patch(patch_me))
}

fn issue_tokens(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user.id, user.user_type)?;
    let refresh_token = keys.sign_refresh(user.id, user.user_type)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from(user),
    })
}

fn ensure_can_sign_in(user: &User) -> ApiResult<()> {
    ensure_active(user.status)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();
    let username = payload.username.trim();
    let first_name = single_line(&payload.first_name);
    let last_name = single_line(&payload.last_name);
    let phone = payload
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    if !is_valid_username(username) {
        warn!(username, "invalid username");
        return Err(ApiError::validation(
            "Username must be 3-50 characters of letters, digits, '_', '.' or '-'",
        ));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::validation("First and last name are required"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::validation("Password too short"));
    }
    if phone.is_some_and(|p| p.len() > 15) {
        return Err(ApiError::validation("Phone number is too long"));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        &NewUser {
            username,
            email: &email,
            first_name: &first_name,
            last_name: &last_name,
            phone,
            password_hash: &hash,
            role: Role::User,
        },
    )
    .await
    .map_err(|e| ApiError::from_db(e, "Username or email already registered"))?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let login = payload.login.trim();
    let Some(user) = User::find_by_login(&state.db, login).await? else {
        warn!(login, "login unknown user");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }
    ensure_can_sign_in(&user)?;

    info!(user_id = %user.id, role = ?user.user_type, "user logged in");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    // Role is re-read so a demoted admin does not keep admin tokens.
    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    ensure_can_sign_in(&user)?;

    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<PublicUser>> {
    let user = User::find_by_id(&state.db, auth.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn patch_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<PublicUser>> {
    let id = auth.id;
    let current = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

    let first_name = payload
        .first_name
        .as_deref()
        .map(single_line)
        .unwrap_or(current.first_name);
    let last_name = payload
        .last_name
        .as_deref()
        .map(single_line)
        .unwrap_or(current.last_name);
    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or(current.email);
    let phone = match payload.phone.as_deref().map(str::trim) {
        Some("") => None,
        Some(p) => Some(p.to_string()),
        None => current.phone,
    };

    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::validation("First and last name are required"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::validation("Invalid email"));
    }
    if phone.as_deref().is_some_and(|p| p.len() > 15) {
        return Err(ApiError::validation("Phone number is too long"));
    }

    let user = User::update_profile(
        &state.db,
        id,
        &first_name,
        &last_name,
        phone.as_deref(),
        &email,
    )
    .await
    .map_err(|e| ApiError::from_db(e, "Email already registered"))?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(user.into()))
}

#[cfg(test)]
mod me_tests {
    use super::*;
    use crate::auth::repo_types::UserStatus;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn user(status: UserStatus) -> User {
        User {
            id: Uuid::new_v4(),
            username: "reader".into(),
            email: "reader@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Reader".into(),
            phone: None,
            password_hash: "$argon2id$secret".into(),
            user_type: Role::User,
            status,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn public_user_hides_password_hash() {
        let json = serde_json::to_string(&PublicUser::from(user(UserStatus::Active))).unwrap();
        assert!(json.contains("reader@example.com"));
        assert!(json.contains("\"full_name\":\"Ada Reader\""));
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn only_active_accounts_sign_in() {
        assert!(ensure_can_sign_in(&user(UserStatus::Active)).is_ok());
        assert!(matches!(
            ensure_can_sign_in(&user(UserStatus::Suspended)),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            ensure_can_sign_in(&user(UserStatus::Inactive)),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn issued_tokens_carry_role() {
        let state = AppState::fake();
        let mut admin = user(UserStatus::Active);
        admin.user_type = Role::Admin;
        let resp = issue_tokens(&state, admin).unwrap();
        let claims = JwtKeys::from_ref(&state).verify(&resp.access_token).unwrap();
        assert_eq!(claims.role, Role::Admin);
    }
}
