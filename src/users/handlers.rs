use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{AdminUpdateRequest, UserQuery},
    repo::{self, AdminChanges, UserFilter},
    services::check_self_change,
};
use crate::{
    auth::{dto::PublicUser, extractors::AdminUser, repo_types::User},
    catalog::services::{search_term, single_line},
    db::Removal,
    error::{ApiError, ApiResult},
    pagination::Page,
    state::AppState,
};

pub fn user_admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route(
            "/admin/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(q): Query<UserQuery>,
) -> ApiResult<Json<Page<PublicUser>>> {
    let page = q.page();
    let filter = UserFilter {
        pattern: search_term(q.q.as_deref()),
        role: q.role,
        status: q.status,
    };
    let (users, total) = repo::list(&state.db, &filter, page.limit, page.offset).await?;
    let items = users.into_iter().map(PublicUser::from).collect();
    Ok(Json(Page::new(items, total, page)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PublicUser>> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateRequest>,
) -> ApiResult<Json<PublicUser>> {
    check_self_change(admin_id, id, &payload).map_err(|m| ApiError::Forbidden(m.into()))?;

    let current = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

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
    let phone = match payload.phone.as_deref().map(str::trim) {
        Some("") => None,
        Some(p) => Some(p.to_string()),
        None => current.phone,
    };
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::validation("First and last name are required"));
    }
    if phone.as_deref().is_some_and(|p| p.len() > 15) {
        return Err(ApiError::validation("Phone number is too long"));
    }

    let changes = AdminChanges {
        first_name: &first_name,
        last_name: &last_name,
        phone: phone.as_deref(),
        role: payload.role.unwrap_or(current.user_type),
        status: payload.status.unwrap_or(current.status),
    };
    let user = repo::update(&state.db, id, &changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!(%admin_id, user_id = %id, role = ?user.user_type, status = ?user.status, "user updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if admin_id == id {
        return Err(ApiError::Forbidden("You cannot delete your own account".into()));
    }
    // Cascading the borrow records would strand their copies off the shelf.
    let mut tx = state.db.begin().await?;
    let removal = repo::delete(&mut tx, id).await?;
    tx.commit().await?;
    if let Removal::InUse(active) = removal {
        warn!(user_id = %id, active, "delete refused; user has active borrows");
    }
    removal.into_result("User not found", |n| format!("User still has {n} active borrow(s)"))?;
    info!(%admin_id, user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
