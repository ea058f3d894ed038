use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{
    repo,
    services::{match_volume, normalize_isbn, CatalogMatches, VolumeInfo},
};
use crate::{auth::extractors::AdminUser, error::ApiResult, state::AppState};

pub fn isbn_routes() -> Router<AppState> {
    Router::new().route("/isbn/lookup", post(lookup_isbn))
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub isbn: String,
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub isbn: String,
    #[serde(flatten)]
    pub volume: VolumeInfo,
    #[serde(flatten)]
    pub matches: CatalogMatches,
}

#[instrument(skip(state, payload))]
pub async fn lookup_isbn(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<LookupRequest>,
) -> ApiResult<Json<LookupResponse>> {
    let isbn = normalize_isbn(&payload.isbn)?;
    let volume = state.metadata.lookup(&isbn).await?;

    let names = repo::reference_names(&state.db).await?;
    let matches = match_volume(&volume, &names.categories, &names.publishers, &names.authors);
    info!(
        %isbn,
        title = %volume.title,
        category = matches.matched_category.is_some(),
        publisher = matches.matched_publisher.is_some(),
        authors = matches.matched_authors.len(),
        "isbn lookup"
    );
    Ok(Json(LookupResponse {
        isbn,
        volume,
        matches,
    }))
}
