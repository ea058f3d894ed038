use serde::Serialize;
use time::Date;
use tracing::{info, warn};
use uuid::Uuid;

use super::repo::ReminderTarget;
use crate::lending::rules::classify;
use crate::mailer::{self, Mailer};

pub const MAX_DAYS_THRESHOLD: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    DueSoon,
    Overdue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    NoEmail,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryDetail {
    pub record_id: Uuid,
    pub user: String,
    pub book: String,
    pub due_date: Date,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_overdue: Option<i64>,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub details: Vec<DeliveryDetail>,
}

/// Picks the active records a batch of `kind` goes to: due within `window` days
/// (today included) for reminders, past due for overdue notices.
pub fn select_targets(
    kind: ReminderKind,
    today: Date,
    window: i64,
    active: Vec<ReminderTarget>,
) -> Vec<ReminderTarget> {
    let c = classify(today, window, active);
    match kind {
        ReminderKind::DueSoon => c
            .due_today
            .into_iter()
            .chain(c.due_soon.into_iter().map(|d| d.item))
            .collect(),
        ReminderKind::Overdue => c.overdue.into_iter().map(|o| o.item).collect(),
    }
}

/// Mails every target; a failed delivery is recorded and the batch continues.
pub async fn send_reminders(
    mailer: &dyn Mailer,
    kind: ReminderKind,
    targets: Vec<ReminderTarget>,
    today: Date,
) -> BulkReport {
    let mut report = BulkReport {
        total: targets.len(),
        ..Default::default()
    };

    for t in targets {
        let days = (t.due_date - today).whole_days();
        let days_overdue = (kind == ReminderKind::Overdue).then_some(-days);
        let mut detail = DeliveryDetail {
            record_id: t.record_id,
            user: t.username.clone(),
            book: t.book_title.clone(),
            due_date: t.due_date,
            days_overdue,
            status: DeliveryStatus::Sent,
            error: None,
        };

        if t.email.trim().is_empty() {
            warn!(user_id = %t.user_id, "no email address for borrower");
            detail.status = DeliveryStatus::NoEmail;
            report.failure += 1;
            report.details.push(detail);
            continue;
        }

        let name = t.display_name();
        let message = match kind {
            ReminderKind::DueSoon => {
                mailer::due_reminder(&t.email, &name, &t.book_title, t.due_date, days)
            }
            ReminderKind::Overdue => {
                mailer::overdue_notice(&t.email, &name, &t.book_title, t.due_date, -days)
            }
        };

        match mailer.send(&message).await {
            Ok(()) => report.success += 1,
            Err(e) => {
                warn!(user_id = %t.user_id, record_id = %t.record_id, error = %e, "reminder delivery failed");
                detail.status = DeliveryStatus::Failed;
                detail.error = Some(e.to_string());
                report.failure += 1;
            }
        }
        report.details.push(detail);
    }

    info!(kind = ?kind, total = report.total, success = report.success, failure = report.failure, "reminder batch finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::RecordingMailer;
    use time::macros::date;

    fn target(username: &str, email: &str, due: Date) -> ReminderTarget {
        ReminderTarget {
            record_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            first_name: "Ada".into(),
            last_name: "Reader".into(),
            book_title: "Dune".into(),
            due_date: due,
        }
    }

    fn usernames(targets: &[ReminderTarget]) -> Vec<&str> {
        targets.iter().map(|t| t.username.as_str()).collect()
    }

    #[test]
    fn reminders_cover_today_through_threshold() {
        let today = date!(2024 - 03 - 10);
        let active = vec![
            target("late", "l@x.org", date!(2024 - 03 - 09)),
            target("edge", "e@x.org", date!(2024 - 03 - 13)),
            target("today", "t@x.org", date!(2024 - 03 - 10)),
            target("beyond", "b@x.org", date!(2024 - 03 - 14)),
        ];
        let picked = select_targets(ReminderKind::DueSoon, today, 3, active);
        assert_eq!(usernames(&picked), ["today", "edge"]);
    }

    #[test]
    fn overdue_selection_starts_yesterday() {
        let today = date!(2024 - 03 - 10);
        let active = vec![
            target("today", "t@x.org", date!(2024 - 03 - 10)),
            target("yesterday", "y@x.org", date!(2024 - 03 - 09)),
            target("week", "w@x.org", date!(2024 - 03 - 03)),
        ];
        let picked = select_targets(ReminderKind::Overdue, today, 3, active);
        assert_eq!(usernames(&picked), ["week", "yesterday"]);
    }

    #[tokio::test]
    async fn failures_are_reported_without_aborting_the_batch() {
        let mailer = RecordingMailer::failing_for(&["bounce@x.org"]);
        let today = date!(2024 - 03 - 10);
        let targets = vec![
            target("ada", "ada@x.org", date!(2024 - 03 - 12)),
            target("bob", "bounce@x.org", date!(2024 - 03 - 11)),
            target("cy", "", date!(2024 - 03 - 13)),
            target("dee", "dee@x.org", date!(2024 - 03 - 10)),
        ];

        let report = send_reminders(&mailer, ReminderKind::DueSoon, targets, today).await;
        assert_eq!(report.total, 4);
        assert_eq!(report.success, 2);
        assert_eq!(report.failure, 2);
        assert_eq!(report.details[1].status, DeliveryStatus::Failed);
        assert_eq!(report.details[2].status, DeliveryStatus::NoEmail);

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(sent[0].body.contains("due in 2 day(s)"));
        assert!(sent[1].body.contains("due in 0 day(s)"));
    }

    #[tokio::test]
    async fn overdue_batch_counts_days_overdue() {
        let mailer = RecordingMailer::new();
        let today = date!(2024 - 03 - 10);
        let report = send_reminders(
            &mailer,
            ReminderKind::Overdue,
            vec![target("ada", "ada@x.org", date!(2024 - 03 - 06))],
            today,
        )
        .await;
        assert_eq!(report.details[0].days_overdue, Some(4));
        assert_eq!(mailer.sent().await[0].subject, "ShelfSmart - Overdue Book Notice");
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let mut t = target("ada", "ada@x.org", date!(2024 - 03 - 06));
        t.first_name.clear();
        t.last_name.clear();
        assert_eq!(t.display_name(), "ada");
    }

    #[test]
    fn report_serializes_status_names() {
        let detail = DeliveryDetail {
            record_id: Uuid::nil(),
            user: "ada".into(),
            book: "Dune".into(),
            due_date: date!(2024 - 03 - 06),
            days_overdue: None,
            status: DeliveryStatus::NoEmail,
            error: None,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["status"], "no_email");
        assert!(json.get("days_overdue").is_none());
    }
}
