use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    repo::{self, Totals},
    services::{
        fill_months, overdue_borrowers, patron_dashboard, OverdueBorrower, PatronDashboard,
        DEFAULT_PER_PAGE,
    },
};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::ApiResult,
    lending::{handlers::today, LoanFilter},
    pagination::{paginate_numbered, PageNumbered},
    state::AppState,
};

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/me/dashboard", get(my_dashboard))
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MonthlyActivity {
    pub year: i32,
    pub borrowed: [i64; 12],
    pub returned: [i64; 12],
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    #[serde(flatten)]
    pub totals: Totals,
    pub overdue: PageNumbered<OverdueBorrower>,
    pub monthly: MonthlyActivity,
}

#[instrument(skip(state))]
pub async fn dashboard(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Query(q): Query<DashboardQuery>,
) -> ApiResult<Json<Dashboard>> {
    let today = today();
    let year = today.year();

    let totals = repo::totals(&state.db).await?;
    let overdue = overdue_borrowers(today, repo::active_rows(&state.db).await?);
    let borrowed = repo::borrowed_per_month(&state.db, year).await?;
    let returned = repo::returned_per_month(&state.db, year).await?;

    debug!(%admin_id, overdue = overdue.len(), "dashboard assembled");
    Ok(Json(Dashboard {
        totals,
        overdue: paginate_numbered(
            overdue,
            q.page.unwrap_or(1),
            q.per_page.unwrap_or(DEFAULT_PER_PAGE),
        ),
        monthly: MonthlyActivity {
            year,
            borrowed: fill_months(&borrowed),
            returned: fill_months(&returned),
        },
    }))
}

#[instrument(skip(state))]
pub async fn my_dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<PatronDashboard>> {
    let loans = state.lending.loans_for_patron(auth.id, LoanFilter::All).await?;
    let summary = patron_dashboard(today(), loans);
    debug!(user_id = %auth.id, borrowed = summary.total_borrowed, overdue = summary.total_overdue, "patron dashboard assembled");
    Ok(Json(summary))
}
