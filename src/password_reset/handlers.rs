use axum::{extract::State, routing::post, Json, Router};
use tracing::instrument;

use super::{
    dto::{ConfirmRequest, ResetRequest, ResetRequested, ResetStatus, VerifyRequest},
    services,
};
use crate::{error::ApiResult, state::AppState};

pub fn reset_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/password-reset/request", post(request_code))
        .route("/auth/password-reset/verify", post(verify_code))
        .route("/auth/password-reset/confirm", post(confirm_reset))
}

#[instrument(skip(state, payload))]
pub async fn request_code(
    State(state): State<AppState>,
    Json(payload): Json<ResetRequest>,
) -> ApiResult<Json<ResetRequested>> {
    Ok(Json(services::request_reset(&state, &payload.username).await?))
}

#[instrument(skip(state, payload))]
pub async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> ApiResult<Json<ResetStatus>> {
    services::verify(&state, &payload.username, payload.code.trim()).await?;
    Ok(Json(ResetStatus { success: true }))
}

#[instrument(skip(state, payload))]
pub async fn confirm_reset(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmRequest>,
) -> ApiResult<Json<ResetStatus>> {
    services::confirm(
        &state,
        &payload.username,
        payload.code.trim(),
        &payload.new_password,
    )
    .await?;
    Ok(Json(ResetStatus { success: true }))
}
