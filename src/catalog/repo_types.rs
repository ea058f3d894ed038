use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::lending::rules::Availability;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AuthorRole {
    #[default]
    Primary,
    CoAuthor,
    Editor,
    Translator,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Book {
    pub id: Uuid,
    pub isbn: Option<String>,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<Date>,
    pub edition: Option<String>,
    pub pages: Option<i32>,
    pub language: String,
    pub publisher_id: Uuid,
    pub category_id: Uuid,
    pub total_copies: i32,
    pub quantity: i32,
    pub cover_image_url: Option<String>,
    pub availability: Availability,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Book row with its category and publisher names.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BookSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub book: Book,
    pub category_name: String,
    pub publisher_name: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BookAuthorRef {
    pub author_id: Uuid,
    pub full_name: String,
    pub author_role: AuthorRole,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Author {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub biography: Option<String>,
    pub nationality: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Author {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Publisher {
    pub id: Uuid,
    pub publisher_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub established_year: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub category_name: String,
    pub description: Option<String>,
    pub parent_category_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
