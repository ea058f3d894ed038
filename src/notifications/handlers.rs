use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{
    repo,
    services::{select_targets, send_reminders, BulkReport, ReminderKind, MAX_DAYS_THRESHOLD},
};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::{ApiError, ApiResult},
    lending::{handlers::today, repo_types::Loan, rules::classify, rules::Classification, LoanFilter},
    settings::repo::AppSettings,
    state::AppState,
};

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/me/notifications", get(my_notifications))
        .route("/admin/notifications/due-reminders", post(send_due_reminders))
        .route("/admin/notifications/overdue", post(send_overdue_notices))
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    #[serde(flatten)]
    pub classification: Classification<Loan>,
    pub total_notifications: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct DueReminderRequest {
    pub days_threshold: Option<i64>,
}

#[instrument(skip(state))]
pub async fn my_notifications(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<NotificationsResponse>> {
    let window = state.settings.get().await?.due_soon_window();
    let loans = state
        .lending
        .loans_for_patron(user.id, LoanFilter::Active)
        .await?;
    let classification = classify(today(), window, loans);
    Ok(Json(NotificationsResponse {
        total_notifications: classification.total_notifications(),
        classification,
    }))
}

async fn ensure_mail_enabled(state: &AppState) -> ApiResult<AppSettings> {
    let s = state.settings.get().await?;
    if !s.email_notifications {
        return Err(ApiError::conflict("Email notifications are disabled in settings"));
    }
    Ok(s)
}

#[instrument(skip(state, payload))]
pub async fn send_due_reminders(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    payload: Option<Json<DueReminderRequest>>,
) -> ApiResult<Json<BulkReport>> {
    let settings = ensure_mail_enabled(&state).await?;
    let threshold = payload
        .and_then(|Json(p)| p.days_threshold)
        .unwrap_or_else(|| settings.due_soon_window());
    if !(1..=MAX_DAYS_THRESHOLD).contains(&threshold) {
        return Err(ApiError::validation(format!(
            "days_threshold must be between 1 and {MAX_DAYS_THRESHOLD}"
        )));
    }

    let today = today();
    let active = repo::active_targets(&state.db).await?;
    let targets = select_targets(ReminderKind::DueSoon, today, threshold, active);
    let report = send_reminders(state.mailer.as_ref(), ReminderKind::DueSoon, targets, today).await;
    info!(%admin_id, threshold, sent = report.success, failed = report.failure, "due reminders sent");
    Ok(Json(report))
}

#[instrument(skip(state))]
pub async fn send_overdue_notices(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
) -> ApiResult<Json<BulkReport>> {
    ensure_mail_enabled(&state).await?;
    let today = today();
    let active = repo::active_targets(&state.db).await?;
    let targets = select_targets(ReminderKind::Overdue, today, 0, active);
    let report = send_reminders(state.mailer.as_ref(), ReminderKind::Overdue, targets, today).await;
    info!(%admin_id, sent = report.success, failed = report.failure, "overdue notices sent");
    Ok(Json(report))
}
