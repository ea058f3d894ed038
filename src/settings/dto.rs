use serde::Deserialize;

use super::repo::AppSettings;

/// Partial update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub library_name: Option<String>,
    pub email_notifications: Option<bool>,
    pub default_borrow_days: Option<i32>,
    pub max_renewals: Option<i32>,
    pub due_soon_days: Option<i32>,
}

impl UpdateSettingsRequest {
    pub fn apply(self, mut current: AppSettings) -> Result<AppSettings, String> {
        if let Some(name) = self.library_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err("library_name must not be empty".into());
            }
            current.library_name = name;
        }
        if let Some(v) = self.email_notifications {
            current.email_notifications = v;
        }
        if let Some(days) = self.default_borrow_days {
            if !(1..=365).contains(&days) {
                return Err("default_borrow_days must be between 1 and 365".into());
            }
            current.default_borrow_days = days;
        }
        if let Some(max) = self.max_renewals {
            if !(0..=10).contains(&max) {
                return Err("max_renewals must be between 0 and 10".into());
            }
            current.max_renewals = max;
        }
        if let Some(days) = self.due_soon_days {
            if !(1..=30).contains(&days) {
                return Err("due_soon_days must be between 1 and 30".into());
            }
            current.due_soon_days = days;
        }
        Ok(current)
    }
}
