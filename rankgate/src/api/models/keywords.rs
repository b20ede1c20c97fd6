//! API models for tracked keywords.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::keywords::{KeywordCreateDBRequest, KeywordDBResponse};
use crate::errors::Error;
use crate::types::KeywordId;

/// Largest batch accepted by one import request.
pub const MAX_IMPORT: usize = 1000;

const DEFAULT_LOCALE: &str = "en-US";

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct KeywordInput {
    #[schema(example = "best running shoes")]
    pub keyword: String,
    /// Defaults to `en-US`
    #[schema(example = "en-US")]
    pub locale: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct KeywordImportRequest {
    pub keywords: Vec<KeywordInput>,
}

impl KeywordImportRequest {
    /// Trim and normalise the batch, dropping duplicates within it.
    ///
    /// Rejects an empty batch, one larger than [`MAX_IMPORT`], and blank keywords.
    pub fn normalize(self) -> Result<Vec<KeywordCreateDBRequest>, Error> {
        if self.keywords.is_empty() {
            return Err(Error::BadRequest {
                message: "At least one keyword is required".to_string(),
            });
        }
        if self.keywords.len() > MAX_IMPORT {
            return Err(Error::BadRequest {
                message: format!("At most {MAX_IMPORT} keywords can be imported at once"),
            });
        }

        let mut seen = HashSet::with_capacity(self.keywords.len());
        let mut normalized = Vec::with_capacity(self.keywords.len());
        for input in self.keywords {
            let keyword = input.keyword.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            if keyword.is_empty() {
                return Err(Error::BadRequest {
                    message: "Keywords must not be blank".to_string(),
                });
            }
            let locale = input
                .locale
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

            let request = KeywordCreateDBRequest { keyword, locale };
            if seen.insert(request.clone()) {
                normalized.push(request);
            }
        }

        Ok(normalized)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeywordResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: KeywordId,
    pub keyword: String,
    pub locale: String,
    pub created_at: DateTime<Utc>,
}

impl From<KeywordDBResponse> for KeywordResponse {
    fn from(keyword: KeywordDBResponse) -> Self {
        Self {
            id: keyword.id,
            keyword: keyword.keyword,
            locale: keyword.locale,
            created_at: keyword.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct KeywordImportResponse {
    /// Distinct keywords in the request, all counted against capacity
    pub requested: usize,
    /// Newly tracked keywords
    pub inserted: Vec<KeywordResponse>,
    /// Keywords that were already tracked
    pub skipped: usize,
}
