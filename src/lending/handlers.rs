use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::{Date, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{AdminBorrowsQuery, LoanView, MyBorrowsQuery, StatusFilter},
    repo_types::{BorrowRecord, Loan},
    rules::due_status,
    store::{Actor, LoanFilter},
};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::ApiResult,
    pagination::Page,
    state::AppState,
};

pub fn patron_routes() -> Router<AppState> {
    Router::new()
        .route("/books/:id/borrow", post(borrow_book))
        .route("/me/borrows", get(my_borrows))
        .route("/borrows/:id/return", post(return_book))
        .route("/borrows/:id/renew", post(renew_loan))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/borrows", get(list_borrows))
        .route("/admin/borrows/:id/return", post(admin_return))
}

pub(crate) fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

fn view(loan: Loan, today: Date, due_soon_days: i64) -> LoanView {
    let due_status = (!loan.record.is_returned)
        .then(|| due_status(today, loan.record.due_date, due_soon_days));
    LoanView { loan, due_status }
}

#[instrument(skip(state))]
pub async fn borrow_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path(book_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<BorrowRecord>)> {
    let terms = state.settings.get().await?.loan_terms();
    let record = state
        .lending
        .borrow(user.id, book_id, &terms, today())
        .await?;
    info!(user_id = %user.id, %book_id, record_id = %record.id, due = %record.due_date, "book borrowed");
    Ok((StatusCode::CREATED, Json(record)))
}

#[instrument(skip(state))]
pub async fn my_borrows(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<MyBorrowsQuery>,
) -> ApiResult<Json<Vec<LoanView>>> {
    let window = state.settings.get().await?.due_soon_window();
    let filter = if q.include_returned {
        LoanFilter::All
    } else {
        LoanFilter::Active
    };
    let today = today();
    let loans = state.lending.loans_for_patron(user.id, filter).await?;
    Ok(Json(
        loans.into_iter().map(|l| view(l, today, window)).collect(),
    ))
}

#[instrument(skip(state))]
pub async fn return_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path(record_id): Path<Uuid>,
) -> ApiResult<Json<BorrowRecord>> {
    let record = state
        .lending
        .return_book(record_id, Actor::Patron(user.id), today())
        .await?;
    info!(user_id = %user.id, %record_id, "book returned");
    Ok(Json(record))
}

#[instrument(skip(state))]
pub async fn renew_loan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(record_id): Path<Uuid>,
) -> ApiResult<Json<BorrowRecord>> {
    let terms = state.settings.get().await?.loan_terms();
    let record = state.lending.renew(record_id, user.id, &terms).await?;
    info!(user_id = %user.id, %record_id, renewals = record.renewal_count, due = %record.due_date, "loan renewed");
    Ok(Json(record))
}

#[instrument(skip(state))]
pub async fn list_borrows(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(q): Query<AdminBorrowsQuery>,
) -> ApiResult<Json<Page<LoanView>>> {
    let window = state.settings.get().await?.due_soon_window();
    let today = today();
    let filter = match q.status {
        StatusFilter::Active => LoanFilter::Active,
        StatusFilter::Overdue => LoanFilter::Overdue(today),
        StatusFilter::Returned => LoanFilter::Returned,
        StatusFilter::All => LoanFilter::All,
    };
    let page = q.page();
    let (loans, total) = state
        .lending
        .all_loans(filter, page.limit, page.offset)
        .await?;
    let items = loans.into_iter().map(|l| view(l, today, window)).collect();
    Ok(Json(Page::new(items, total, page)))
}

#[instrument(skip(state))]
pub async fn admin_return(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(record_id): Path<Uuid>,
) -> ApiResult<Json<BorrowRecord>> {
    let record = state
        .lending
        .return_book(record_id, Actor::Librarian, today())
        .await?;
    info!(%admin_id, %record_id, "book returned by librarian");
    Ok(Json(record))
}
