pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod isbn;
pub mod lending;
pub mod mailer;
pub mod notifications;
pub mod pagination;
pub mod password_reset;
pub mod search_history;
pub mod settings;
pub mod state;
pub mod users;
