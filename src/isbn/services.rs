//! ISBN normalisation, the metadata provider seam and matching of provider
//! names against the local catalog.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BooksApiConfig;
use crate::error::ApiError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Invalid ISBN format. ISBN must be 10 or 13 digits.")]
    InvalidIsbn,

    #[error("No book found with this ISBN")]
    NotFound,

    #[error("book metadata provider timed out")]
    Timeout,

    #[error("book metadata provider failed: {0}")]
    Upstream(String),
}

impl From<LookupError> for ApiError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::InvalidIsbn => ApiError::Validation(e.to_string()),
            LookupError::NotFound => ApiError::NotFound(e.to_string()),
            LookupError::Timeout => ApiError::Timeout(e.to_string()),
            LookupError::Upstream(msg) => ApiError::Upstream(msg),
        }
    }
}

/// Strips hyphens and spaces; the rest must be 10 or 13 ASCII digits.
pub fn normalize_isbn(raw: &str) -> Result<String, LookupError> {
    let isbn: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '-' && *c != ' ')
        .collect();
    let digits_only = isbn.chars().all(|c| c.is_ascii_digit());
    if !digits_only || !(isbn.len() == 10 || isbn.len() == 13) {
        return Err(LookupError::InvalidIsbn);
    }
    Ok(isbn)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndustryIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: String,
}

/// Subset of a Google Books `volumeInfo` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    #[serde(default)]
    pub title: String,
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub description: Option<String>,
    pub page_count: Option<i32>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub image_links: HashMap<String, String>,
    #[serde(default)]
    pub industry_identifiers: Vec<IndustryIdentifier>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    #[serde(default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumesResponse {
    #[serde(default)]
    total_items: i64,
    #[serde(default)]
    items: Vec<Volume>,
}

/// First volume of a `/volumes` search body.
pub fn first_volume(body: &str) -> Result<VolumeInfo, LookupError> {
    let parsed: VolumesResponse = serde_json::from_str(body)
        .map_err(|e| LookupError::Upstream(format!("unreadable response: {e}")))?;
    if parsed.total_items == 0 {
        return Err(LookupError::NotFound);
    }
    parsed
        .items
        .into_iter()
        .next()
        .map(|v| v.volume_info)
        .ok_or(LookupError::NotFound)
}

#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn lookup(&self, isbn: &str) -> Result<VolumeInfo, LookupError>;
}

pub struct GoogleBooksClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(cfg: &BooksApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("shelfsmart/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl MetadataClient for GoogleBooksClient {
    async fn lookup(&self, isbn: &str) -> Result<VolumeInfo, LookupError> {
        let url = format!("{}/volumes", self.base_url);
        let mut params = vec![("q", format!("isbn:{isbn}"))];
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }
        debug!(%url, isbn, "querying book metadata provider");

        let resp = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, isbn, "book metadata request failed");
                if e.is_timeout() {
                    LookupError::Timeout
                } else {
                    LookupError::Upstream(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%status, isbn, "book metadata provider returned an error");
            return Err(LookupError::Upstream(format!("provider returned {status}")));
        }

        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::Timeout
            } else {
                LookupError::Upstream(e.to_string())
            }
        })?;
        first_volume(&body)
    }
}

/// Fixed answers keyed by normalised ISBN.
#[derive(Default)]
pub struct CannedMetadataClient {
    volumes: HashMap<String, VolumeInfo>,
}

impl CannedMetadataClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, isbn: &str, info: VolumeInfo) -> Self {
        self.volumes.insert(isbn.to_string(), info);
        self
    }
}

#[async_trait]
impl MetadataClient for CannedMetadataClient {
    async fn lookup(&self, isbn: &str) -> Result<VolumeInfo, LookupError> {
        self.volumes.get(isbn).cloned().ok_or(LookupError::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct NamedRef {
    pub id: uuid::Uuid,
    pub name: String,
}

/// Case-insensitive: an exact name wins, otherwise the first name (in sorted
/// order) that contains `needle`.
pub fn best_match<'a>(needle: &str, candidates: &'a [NamedRef]) -> Option<&'a NamedRef> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    if let Some(exact) = candidates.iter().find(|c| c.name.to_lowercase() == needle) {
        return Some(exact);
    }
    let mut sorted: Vec<&NamedRef> = candidates.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
        .into_iter()
        .find(|c| c.name.to_lowercase().contains(&needle))
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct CatalogMatches {
    pub matched_category: Option<NamedRef>,
    pub matched_publisher: Option<NamedRef>,
    pub matched_authors: Vec<NamedRef>,
}

pub fn match_volume(
    info: &VolumeInfo,
    categories: &[NamedRef],
    publishers: &[NamedRef],
    authors: &[NamedRef],
) -> CatalogMatches {
    let matched_category = info
        .categories
        .iter()
        .find_map(|c| best_match(c, categories))
        .cloned();
    let matched_publisher = info
        .publisher
        .as_deref()
        .and_then(|p| best_match(p, publishers))
        .cloned();
    let matched_authors = info
        .authors
        .iter()
        .filter_map(|a| best_match(a, authors))
        .cloned()
        .collect();
    CatalogMatches {
        matched_category,
        matched_publisher,
        matched_authors,
    }
}
