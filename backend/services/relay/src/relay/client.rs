use std::time::Duration;

use hubsync_config::AppConfig;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::connector::Collection;

#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    pub clients_url: String,
    pub products_url: String,
    pub timeout_secs: u64,
}

impl From<&AppConfig> for RelayClientConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            clients_url: config.clients_webhook_url.clone(),
            products_url: config.products_webhook_url.clone(),
            timeout_secs: config.http_timeout_secs,
        }
    }
}

/// Delivers mapped records to the per-collection webhook sinks.
///
/// One attempt per call; the caller decides what a failure means.
#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    config: RelayClientConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),
}

impl RelayClient {
    pub fn new(config: RelayClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn webhook_url(&self, collection: Collection) -> &str {
        match collection {
            Collection::Clients => &self.config.clients_url,
            Collection::Products => &self.config.products_url,
        }
    }

    /// POST `payload` as JSON to the collection's webhook.
    pub async fn deliver<P>(&self, collection: Collection, payload: &P) -> Result<(), RelayError>
    where
        P: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(self.webhook_url(collection))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(RelayError::HttpError { status, body })
    }
}
