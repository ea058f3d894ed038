use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::collections::HashMap;

use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{
        AuthorInput, AuthorView, BookDetail, BookInput, BookQuery, CategoryInput, CategoryView,
        NameQuery, PublisherInput,
    },
    repo::{self, BookFilter, RefTable},
    repo_types::{BookSummary, Category, Publisher},
    services::{
        creates_cycle, full_path, resize_pool, search_term, validate_author, validate_book,
        validate_category, validate_publisher, ValidBook,
    },
};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::{ApiError, ApiResult},
    pagination::Page,
    state::AppState,
};

pub fn book_routes() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books).post(create_book))
        .route("/books/:id", get(get_book).put(update_book).delete(delete_book))
}

pub fn reference_routes() -> Router<AppState> {
    Router::new()
        .route("/authors", get(list_authors).post(create_author))
        .route("/authors/:id", get(get_author).put(update_author).delete(delete_author))
        .route("/publishers", get(list_publishers).post(create_publisher))
        .route(
            "/publishers/:id",
            get(get_publisher).put(update_publisher).delete(delete_publisher),
        )
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
}

// ---- books ----

#[instrument(skip(state))]
pub async fn list_books(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(q): Query<BookQuery>,
) -> ApiResult<Json<Page<BookSummary>>> {
    let page = q.page();
    let filter = BookFilter {
        pattern: search_term(q.q.as_deref()),
        category_id: q.category_id,
        publisher_id: q.publisher_id,
        available_only: q.available_only,
    };
    let (items, total) = repo::list_books(&state.db, &filter, page.limit, page.offset).await?;
    Ok(Json(Page::new(items, total, page)))
}

async fn load_detail(state: &AppState, id: Uuid) -> ApiResult<BookDetail> {
    let summary = repo::get_book(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;
    let authors = repo::book_authors(&state.db, id).await?;
    Ok(BookDetail { summary, authors })
}

#[instrument(skip(state))]
pub async fn get_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BookDetail>> {
    Ok(Json(load_detail(&state, id).await?))
}

/// Category, publisher and every linked author must exist.
async fn ensure_references(conn: &mut PgConnection, b: &ValidBook) -> ApiResult<()> {
    if !repo::reference_exists(conn, RefTable::Category, b.category_id).await? {
        return Err(ApiError::validation("Category not found"));
    }
    if !repo::reference_exists(conn, RefTable::Publisher, b.publisher_id).await? {
        return Err(ApiError::validation("Publisher not found"));
    }
    if let Some(links) = &b.authors {
        let ids: Vec<Uuid> = links.iter().map(|l| l.author_id).collect();
        let missing = repo::missing_authors(conn, &ids).await?;
        if !missing.is_empty() {
            return Err(ApiError::validation(format!(
                "Unknown author ids: {}",
                missing
                    .iter()
                    .map(Uuid::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
    }
    Ok(())
}

const DUPLICATE_ISBN: &str = "A book with this ISBN already exists";

#[instrument(skip(state, payload))]
pub async fn create_book(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Json(payload): Json<BookInput>,
) -> ApiResult<(StatusCode, Json<BookDetail>)> {
    let valid = validate_book(payload, true).map_err(ApiError::Validation)?;
    let quantity = valid.quantity.unwrap_or(valid.total_copies);

    let mut tx = state.db.begin().await?;
    ensure_references(&mut tx, &valid).await?;
    let book = repo::insert_book(&mut tx, &valid, quantity)
        .await
        .map_err(|e| ApiError::from_db(e, DUPLICATE_ISBN))?;
    if let Some(links) = &valid.authors {
        repo::replace_authors(&mut tx, book.id, links).await?;
    }
    tx.commit().await?;

    info!(%admin_id, book_id = %book.id, title = %book.title, "book created");
    Ok((StatusCode::CREATED, Json(load_detail(&state, book.id).await?)))
}

#[instrument(skip(state, payload))]
pub async fn update_book(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<BookInput>,
) -> ApiResult<Json<BookDetail>> {
    let valid = validate_book(payload, false).map_err(ApiError::Validation)?;

    let mut tx = state.db.begin().await?;
    let (old_quantity, old_total) = repo::lock_pool(&mut tx, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;
    ensure_references(&mut tx, &valid).await?;
    let quantity = resize_pool(old_quantity, old_total, valid.total_copies, valid.quantity)
        .map_err(ApiError::Conflict)?;
    repo::update_book(&mut tx, id, &valid, quantity)
        .await
        .map_err(|e| ApiError::from_db(e, DUPLICATE_ISBN))?;
    if let Some(links) = &valid.authors {
        repo::replace_authors(&mut tx, id, links).await?;
    }
    tx.commit().await?;

    info!(%admin_id, book_id = %id, quantity, total = valid.total_copies, "book updated");
    Ok(Json(load_detail(&state, id).await?))
}

#[instrument(skip(state))]
pub async fn delete_book(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;
    let removal = repo::delete_book(&mut tx, id).await?;
    tx.commit().await?;
    removal.into_result("Book not found", |n| format!("Book has {n} copy(ies) on loan"))?;
    info!(%admin_id, book_id = %id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---- authors ----

#[instrument(skip(state))]
pub async fn list_authors(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(q): Query<NameQuery>,
) -> ApiResult<Json<Vec<AuthorView>>> {
    let pattern = search_term(q.q.as_deref());
    let authors = repo::list_authors(&state.db, pattern.as_deref()).await?;
    Ok(Json(authors.into_iter().map(AuthorView::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_author(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AuthorView>> {
    let author = repo::get_author(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Author not found"))?;
    Ok(Json(author.into()))
}

const DUPLICATE_AUTHOR: &str = "An author with this name already exists";

#[instrument(skip(state, payload))]
pub async fn create_author(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Json(payload): Json<AuthorInput>,
) -> ApiResult<(StatusCode, Json<AuthorView>)> {
    let valid = validate_author(payload).map_err(ApiError::Validation)?;
    let author = repo::create_author(&state.db, &valid)
        .await
        .map_err(|e| ApiError::from_db(e, DUPLICATE_AUTHOR))?;
    info!(%admin_id, author_id = %author.id, "author created");
    Ok((StatusCode::CREATED, Json(author.into())))
}

#[instrument(skip(state, payload))]
pub async fn update_author(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AuthorInput>,
) -> ApiResult<Json<AuthorView>> {
    let valid = validate_author(payload).map_err(ApiError::Validation)?;
    let author = repo::update_author(&state.db, id, &valid)
        .await
        .map_err(|e| ApiError::from_db(e, DUPLICATE_AUTHOR))?
        .ok_or_else(|| ApiError::not_found("Author not found"))?;
    info!(%admin_id, author_id = %id, "author updated");
    Ok(Json(author.into()))
}

#[instrument(skip(state))]
pub async fn delete_author(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let books = repo::author_book_count(&state.db, id).await?;
    if books > 0 {
        return Err(ApiError::conflict(format!("Author is linked to {books} book(s)")));
    }
    if !repo::delete_author(&state.db, id).await? {
        return Err(ApiError::not_found("Author not found"));
    }
    info!(%admin_id, author_id = %id, "author deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---- publishers ----

#[instrument(skip(state))]
pub async fn list_publishers(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(q): Query<NameQuery>,
) -> ApiResult<Json<Vec<Publisher>>> {
    let pattern = search_term(q.q.as_deref());
    Ok(Json(repo::list_publishers(&state.db, pattern.as_deref()).await?))
}

#[instrument(skip(state))]
pub async fn get_publisher(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Publisher>> {
    let publisher = repo::get_publisher(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Publisher not found"))?;
    Ok(Json(publisher))
}

const DUPLICATE_PUBLISHER: &str = "A publisher with this name already exists";

#[instrument(skip(state, payload))]
pub async fn create_publisher(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Json(payload): Json<PublisherInput>,
) -> ApiResult<(StatusCode, Json<Publisher>)> {
    let valid = validate_publisher(payload).map_err(ApiError::Validation)?;
    let publisher = repo::create_publisher(&state.db, &valid)
        .await
        .map_err(|e| ApiError::from_db(e, DUPLICATE_PUBLISHER))?;
    info!(%admin_id, publisher_id = %publisher.id, "publisher created");
    Ok((StatusCode::CREATED, Json(publisher)))
}

#[instrument(skip(state, payload))]
pub async fn update_publisher(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PublisherInput>,
) -> ApiResult<Json<Publisher>> {
    let valid = validate_publisher(payload).map_err(ApiError::Validation)?;
    let publisher = repo::update_publisher(&state.db, id, &valid)
        .await
        .map_err(|e| ApiError::from_db(e, DUPLICATE_PUBLISHER))?
        .ok_or_else(|| ApiError::not_found("Publisher not found"))?;
    info!(%admin_id, publisher_id = %id, "publisher updated");
    Ok(Json(publisher))
}

#[instrument(skip(state))]
pub async fn delete_publisher(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let deleted = repo::delete_publisher(&state.db, id)
        .await
        .map_err(|e| ApiError::from_db(e, "Publisher has books"))?;
    if !deleted {
        return Err(ApiError::not_found("Publisher not found"));
    }
    info!(%admin_id, publisher_id = %id, "publisher deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---- categories ----

#[instrument(skip(state))]
pub async fn list_categories(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(q): Query<NameQuery>,
) -> ApiResult<Json<Vec<CategoryView>>> {
    let pattern = search_term(q.q.as_deref());
    let categories = repo::list_categories(&state.db, pattern.as_deref()).await?;
    let tree = repo::category_tree(&state.db).await?;
    Ok(Json(
        categories
            .into_iter()
            .map(|category| CategoryView {
                full_path: full_path(category.id, &tree),
                category,
            })
            .collect(),
    ))
}

async fn category_view(state: &AppState, category: Category) -> ApiResult<CategoryView> {
    let tree = repo::category_tree(&state.db).await?;
    Ok(CategoryView {
        full_path: full_path(category.id, &tree),
        category,
    })
}

#[instrument(skip(state))]
pub async fn get_category(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CategoryView>> {
    let category = repo::get_category(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    Ok(Json(category_view(&state, category).await?))
}

const DUPLICATE_CATEGORY: &str = "A category with this name already exists";

#[instrument(skip(state, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Json(payload): Json<CategoryInput>,
) -> ApiResult<(StatusCode, Json<CategoryView>)> {
    let valid = validate_category(payload).map_err(ApiError::Validation)?;
    if let Some(parent) = valid.parent_category_id {
        if repo::get_category(&state.db, parent).await?.is_none() {
            return Err(ApiError::validation("Parent category not found"));
        }
    }
    let category = repo::create_category(&state.db, &valid)
        .await
        .map_err(|e| ApiError::from_db(e, DUPLICATE_CATEGORY))?;
    info!(%admin_id, category_id = %category.id, "category created");
    Ok((StatusCode::CREATED, Json(category_view(&state, category).await?)))
}

#[instrument(skip(state, payload))]
pub async fn update_category(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryInput>,
) -> ApiResult<Json<CategoryView>> {
    let valid = validate_category(payload).map_err(ApiError::Validation)?;
    if let Some(parent) = valid.parent_category_id {
        let tree = repo::category_tree(&state.db).await?;
        if !tree.contains_key(&parent) {
            return Err(ApiError::validation("Parent category not found"));
        }
        let parents: HashMap<Uuid, Option<Uuid>> =
            tree.iter().map(|(k, (_, p))| (*k, *p)).collect();
        if creates_cycle(id, parent, &parents) {
            return Err(ApiError::validation("A category cannot be its own ancestor"));
        }
    }
    let category = repo::update_category(&state.db, id, &valid)
        .await
        .map_err(|e| ApiError::from_db(e, DUPLICATE_CATEGORY))?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    info!(%admin_id, category_id = %id, "category updated");
    Ok(Json(category_view(&state, category).await?))
}

#[instrument(skip(state))]
pub async fn delete_category(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let deleted = repo::delete_category(&state.db, id)
        .await
        .map_err(|e| ApiError::from_db(e, "Category has books"))?;
    if !deleted {
        return Err(ApiError::not_found("Category not found"));
    }
    info!(%admin_id, category_id = %id, "category deleted");
    Ok(StatusCode::NO_CONTENT)
}
