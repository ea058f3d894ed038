use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod repo;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::search_history_routes()
}
