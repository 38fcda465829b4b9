use std::time::Duration;

use hubsync_config::AppConfig;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::models::{AuthResponse, PageResponse};
use super::query::{list_query, page_count, SyncWindow};
use crate::connector::Collection;

#[derive(Debug, Clone)]
pub struct DataSystemClientConfig {
    pub base_url: String,
    pub cnpj: String,
    pub hash: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl From<&AppConfig> for DataSystemClientConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.datasystem_base_url.trim_end_matches('/').to_string(),
            cnpj: config.datasystem_cnpj.clone(),
            hash: config.datasystem_hash.clone(),
            max_retries: config.fetch_max_retries,
            timeout_secs: config.http_timeout_secs,
        }
    }
}

#[derive(Clone)]
pub struct DataSystemClient {
    client: Client,
    config: DataSystemClientConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("HTTP {status}: {message}")]
    HttpError { status: StatusCode, message: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("token missing from authentication response")]
    MissingToken,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

#[derive(Serialize)]
struct Credentials<'a> {
    cnpj: &'a str,
    hash: &'a str,
}

impl DataSystemClient {
    pub fn new(config: DataSystemClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// For testing: create a client pointing at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    /// Exchange the configured credentials for a bearer token. Never retried.
    pub async fn authenticate(&self) -> Result<String, AuthError> {
        let url = format!("{}/autenticar", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&Credentials {
                cnpj: &self.config.cnpj,
                hash: &self.config.hash,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::HttpError {
                status,
                message: remote_message(&body),
            });
        }

        serde_json::from_str::<AuthResponse>(&body)
            .ok()
            .and_then(|auth| auth.token)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)
    }

    /// Lazily walk every page of `collection` within `window`.
    pub fn pages<'a>(&'a self, token: &'a str, collection: Collection, window: SyncWindow) -> PageCursor<'a> {
        PageCursor {
            client: self,
            token,
            collection,
            window,
            next_page: 1,
            total_pages: None,
            total: 0,
        }
    }

    async fn fetch_page(
        &self,
        token: &str,
        collection: Collection,
        window: &SyncWindow,
        page: u64,
    ) -> Result<PageResponse, FetchError> {
        let url = format!("{}{}", self.config.base_url, collection.path());
        let query = list_query(collection, window, page);
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = std::cmp::min(1u64 << attempt, 30);
                tracing::warn!(%collection, page, attempt, backoff_secs, "retrying after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let response = match self
                .client
                .get(&url)
                .query(&query)
                .bearer_auth(token)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(FetchError::RequestError(e));
                }
            };

            let status = response.status();

            if status.is_success() {
                return response
                    .json::<PageResponse>()
                    .await
                    .map_err(FetchError::RequestError);
            }

            // Honor Retry-After header for 429
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(wait) = retry_after(response.headers()) {
                    tracing::warn!(%collection, wait_secs = wait.as_secs(), "rate-limited, waiting Retry-After");
                    tokio::time::sleep(wait).await;
                }
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body}");
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::HttpError { status, body });
        }

        Err(FetchError::MaxRetriesExceeded {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}

/// Longest honoured `Retry-After`, in seconds.
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Delay requested by a `Retry-After` header in seconds, capped.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

/// One fetched page. Records are raw; converting them is the caller's
/// per-record concern.
#[derive(Debug)]
pub struct Page {
    pub number: u64,
    pub records: Vec<Value>,
}

/// Sequential cursor over a collection's pages.
///
/// Total and page count are fixed by the first response, so later pages
/// cannot move the stopping point.
pub struct PageCursor<'a> {
    client: &'a DataSystemClient,
    token: &'a str,
    collection: Collection,
    window: SyncWindow,
    next_page: u64,
    total_pages: Option<u64>,
    total: u64,
}

impl PageCursor<'_> {
    /// Fetch the next page, or `None` once the last page has been returned.
    pub async fn next_page(&mut self) -> Result<Option<Page>, FetchError> {
        if matches!(self.total_pages, Some(pages) if self.next_page > pages) {
            return Ok(None);
        }

        let number = self.next_page;
        let response = self
            .client
            .fetch_page(self.token, self.collection, &self.window, number)
            .await?;

        if self.total_pages.is_none() {
            self.total = response.total_registros.unwrap_or(0);
            let pages = page_count(response.total_paginas, self.total);
            self.total_pages = Some(pages);
            tracing::debug!(
                collection = %self.collection,
                total = self.total,
                pages,
                "pagination bounds fixed"
            );
        }

        self.next_page += 1;
        Ok(Some(Page {
            number,
            records: response.dados.unwrap_or_default(),
        }))
    }

    /// Total reported by the first page; zero before it is fetched.
    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Pull the remote `message` out of a JSON error body, falling back to the raw body.
fn remote_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.to_string())
}
