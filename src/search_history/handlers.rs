use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    repo::{self, NewEntry, SearchEntry, SearchType},
    services::{clamp_limit, context_filter, normalize_context, normalize_query, DEDUP_WINDOW},
};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn search_history_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/search-history",
            get(list_history).post(save_search).delete(clear_history),
        )
        .route("/search-history/:id", delete(delete_entry))
}

#[derive(Debug, Deserialize)]
pub struct SaveSearchRequest {
    pub query: String,
    #[serde(default)]
    pub search_type: SearchType,
    #[serde(default)]
    pub results_count: i32,
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SaveSearchResponse {
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<SearchEntry>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub items: Vec<SearchEntry>,
    pub total_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub deleted_count: u64,
}

#[instrument(skip(state, payload))]
pub async fn save_search(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<SaveSearchRequest>,
) -> ApiResult<(StatusCode, Json<SaveSearchResponse>)> {
    let query = normalize_query(&payload.query).map_err(ApiError::validation)?;
    let context = normalize_context(payload.context.as_deref()).map_err(ApiError::validation)?;

    let since = OffsetDateTime::now_utc() - DEDUP_WINDOW;
    if repo::exists_since(&state.db, user.id, &query, &context, since).await? {
        debug!(user_id = %user.id, "duplicate search skipped");
        return Ok((
            StatusCode::OK,
            Json(SaveSearchResponse {
                saved: false,
                entry: None,
            }),
        ));
    }

    let entry = repo::insert(
        &state.db,
        user.id,
        &NewEntry {
            query: &query,
            search_type: payload.search_type,
            results_count: payload.results_count.max(0),
            context: &context,
        },
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(SaveSearchResponse {
            saved: true,
            entry: Some(entry),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let (items, total_count) = repo::recent(
        &state.db,
        user.id,
        context_filter(q.context.as_deref()),
        clamp_limit(q.limit),
    )
    .await?;
    Ok(Json(HistoryResponse { items, total_count }))
}

#[instrument(skip(state))]
pub async fn clear_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<ClearQuery>,
) -> ApiResult<Json<ClearResponse>> {
    let deleted_count = repo::clear(&state.db, user.id, context_filter(q.context.as_deref())).await?;
    info!(user_id = %user.id, deleted_count, "search history cleared");
    Ok(Json(ClearResponse { deleted_count }))
}

#[instrument(skip(state))]
pub async fn delete_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !repo::delete_one(&state.db, user.id, id).await? {
        return Err(ApiError::not_found("Search history entry not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
