//! Outgoing mail: the `Mailer` seam, its SMTP and log-only implementations,
//! and the library's message templates.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use time::{macros::format_description, Date};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{MailConfig, SmtpConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()>;
}

/// Builds the configured mailer: SMTP when a host is set, otherwise log-only.
pub fn from_config(cfg: &MailConfig) -> anyhow::Result<std::sync::Arc<dyn Mailer>> {
    Ok(match &cfg.smtp {
        Some(smtp) => std::sync::Arc::new(SmtpMailer::new(smtp, cfg.timeout_secs)?),
        None => {
            warn!("SMTP_HOST not set; outgoing mail will only be logged");
            std::sync::Arc::new(LogMailer)
        }
    })
}

#[derive(Clone)]
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig, timeout_secs: u64) -> anyhow::Result<Self> {
        let from: Mailbox = cfg
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid SMTP_FROM address: {e}"))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)?
            .port(cfg.port)
            .timeout(Some(Duration::from_secs(timeout_secs)));
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from,
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid recipient address: {e}"))?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?;

        self.transport.send(email).await?;
        info!(to = %message.to, subject = %message.subject, "mail sent");
        Ok(())
    }
}

/// Used when no SMTP relay is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        info!(to = %message.to, subject = %message.subject, "mail transport disabled; message dropped");
        Ok(())
    }
}

/// Keeps every message in memory; addresses in `failing` are rejected.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
    failing: Vec<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub async fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        if self.failing.iter().any(|a| a == &message.to) {
            anyhow::bail!("relay rejected {}", message.to);
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

fn long_date(date: Date) -> String {
    date.format(format_description!("[month repr:long] [day], [year]"))
        .unwrap_or_else(|_| date.to_string())
}

pub fn due_reminder(to: &str, name: &str, book_title: &str, due_date: Date, days_left: i64) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: "ShelfSmart - Book Due Soon Reminder".into(),
        body: format!(
            "Hello {name},\n\n\
             This is a friendly reminder that the book \"{book_title}\" is due in {days_left} day(s).\n\n\
             Due Date: {}\n\n\
             Please return the book on or before the due date to avoid any penalties.\n\n\
             Thank you for using ShelfSmart!\n\n\
             Best regards,\n\
             ShelfSmart Library Team",
            long_date(due_date)
        ),
    }
}

pub fn overdue_notice(
    to: &str,
    name: &str,
    book_title: &str,
    due_date: Date,
    days_overdue: i64,
) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: "ShelfSmart - Overdue Book Notice".into(),
        body: format!(
            "Hello {name},\n\n\
             This is a notice that the book \"{book_title}\" is now overdue.\n\n\
             Due Date: {}\n\
             Days Overdue: {days_overdue} day(s)\n\n\
             Please return the book as soon as possible to avoid further penalties. \
             Late returns may affect your borrowing privileges.\n\n\
             If you have already returned the book, please disregard this message.\n\n\
             Best regards,\n\
             ShelfSmart Library Team",
            long_date(due_date)
        ),
    }
}

pub fn password_reset_code(to: &str, name: &str, code: &str, ttl_minutes: i64) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: "ShelfSmart - Password Reset Code".into(),
        body: format!(
            "Hello {name},\n\n\
             Your password reset code is {code}. It expires in {ttl_minutes} minutes \
             and can be used once.\n\n\
             If you did not request a password reset, please ignore this email.\n\n\
             Best regards,\n\
             ShelfSmart Library Team"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn due_reminder_mentions_book_and_long_date() {
        let msg = due_reminder("a@b.org", "Ada Reader", "Dune", date!(2024 - 03 - 05), 2);
        assert_eq!(msg.subject, "ShelfSmart - Book Due Soon Reminder");
        assert!(msg.body.contains("\"Dune\" is due in 2 day(s)"));
        assert!(msg.body.contains("Due Date: March 05, 2024"));
    }

    #[test]
    fn overdue_notice_reports_days_overdue() {
        let msg = overdue_notice("a@b.org", "Ada", "Dune", date!(2024 - 03 - 01), 4);
        assert_eq!(msg.subject, "ShelfSmart - Overdue Book Notice");
        assert!(msg.body.contains("Days Overdue: 4 day(s)"));
    }

    #[tokio::test]
    async fn recording_mailer_keeps_and_rejects() {
        let mailer = RecordingMailer::failing_for(&["bad@x.org"]);
        let ok = password_reset_code("good@x.org", "Ada", "123456", 10);
        let bad = password_reset_code("bad@x.org", "Bob", "654321", 10);
        assert!(mailer.send(&ok).await.is_ok());
        assert!(mailer.send(&bad).await.is_err());
        assert_eq!(mailer.sent().await, vec![ok]);
    }
}
