mod dto;
pub mod handlers;
pub mod repo;
pub mod store;

pub use store::{MemorySettingsStore, PgSettingsStore, SettingsStore};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::settings_routes()
}
