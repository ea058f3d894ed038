use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use super::repo_types::{Author, AuthorRole, BookAuthorRef, BookSummary, Category};
use crate::pagination::Pagination;

#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    pub q: Option<String>,
    pub category_id: Option<Uuid>,
    pub publisher_id: Option<Uuid>,
    #[serde(default)]
    pub available_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl BookQuery {
    pub fn page(&self) -> Pagination {
        Pagination::from_parts(self.limit, self.offset)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NameQuery {
    pub q: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthorLink {
    pub author_id: Uuid,
    #[serde(default)]
    pub role: AuthorRole,
}

/// Create/replace body for a book. `quantity` defaults to the copies not on loan.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookInput {
    pub title: String,
    pub subtitle: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<Date>,
    pub edition: Option<String>,
    pub pages: Option<i32>,
    pub language: Option<String>,
    pub cover_image_url: Option<String>,
    pub category_id: Option<Uuid>,
    pub publisher_id: Option<Uuid>,
    pub total_copies: Option<i32>,
    pub quantity: Option<i32>,
    pub authors: Option<Vec<AuthorLink>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorInput {
    pub first_name: String,
    pub last_name: String,
    pub biography: Option<String>,
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherInput {
    pub publisher_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub established_year: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryInput {
    pub category_name: String,
    pub description: Option<String>,
    pub parent_category_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BookDetail {
    #[serde(flatten)]
    pub summary: BookSummary,
    pub authors: Vec<BookAuthorRef>,
}

#[derive(Debug, Serialize)]
pub struct AuthorView {
    #[serde(flatten)]
    pub author: Author,
    pub full_name: String,
}

impl From<Author> for AuthorView {
    fn from(author: Author) -> Self {
        Self {
            full_name: author.full_name(),
            author,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: Category,
    pub full_path: String,
}
