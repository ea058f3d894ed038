use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument};

use super::{dto::UpdateSettingsRequest, repo::AppSettings};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings))
        .route("/admin/settings", put(update_settings))
}

#[instrument(skip(state))]
pub async fn get_settings(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<AppSettings>> {
    Ok(Json(state.settings.get().await?))
}

#[instrument(skip(state, payload))]
pub async fn update_settings(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Json(payload): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<AppSettings>> {
    let current = state.settings.get().await?;
    let next = payload.apply(current).map_err(ApiError::Validation)?;
    let saved = state.settings.save(&next).await?;
    info!(%admin_id, borrow_days = saved.default_borrow_days, max_renewals = saved.max_renewals, "settings updated");
    Ok(Json(saved))
}
