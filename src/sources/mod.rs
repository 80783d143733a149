/// Review source adapters
///
/// Each adapter fetches reviews from one external source and normalizes the
/// vendor payload into `RawReview`. Errors stop at `ReviewSource::run`, which
/// logs them and reports a failed outcome so the orchestrator can move on.

pub mod booking;
pub mod google;
pub mod scraper;
pub mod synthetic;

pub use booking::BookingSource;
pub use google::GoogleBusinessSource;
pub use scraper::ScraperSource;
pub use synthetic::SyntheticSource;

use crate::{
    credentials::Credential,
    reviews::RawReview,
    sync::{SyncOutcome, SyncRequest, SyncStage},
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors raised inside an adapter
#[derive(Debug, Error)]
pub enum SourceError {
    /// Credentials or API keys are missing
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// The request has no URL or id to look up
    #[error("No locator supplied")]
    MissingLocator,

    /// Network failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Vendor answered with a non-2xx status
    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    /// Vendor payload did not have the expected shape
    #[error("Unexpected payload: {0}")]
    Payload(String),

    /// Lookup succeeded but matched nothing
    #[error("No match: {0}")]
    NoMatch(String),
}

/// Reviews plus whatever the source learned about the connected account
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub reviews: Vec<RawReview>,
    /// Display name such as the business location title
    pub label: Option<String>,
    pub provider_account_id: Option<String>,
}

/// A review source tried by the sync orchestrator
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Position in the fallback chain
    fn stage(&self) -> SyncStage;

    /// Whether this source can serve the request with the current configuration
    fn applies_to(&self, request: &SyncRequest) -> bool;

    /// Platform key of the stored OAuth credential `fetch` needs, if any.
    /// It may differ from the request platform (`google_maps` reads `google`).
    fn credential_platform(&self) -> Option<&'static str> {
        None
    }

    /// Fetch and normalize reviews
    async fn fetch(
        &self,
        request: &SyncRequest,
        credential: Option<&Credential>,
    ) -> Result<SourceBatch, SourceError>;

    /// Adapter boundary: never returns an error
    async fn run(&self, request: &SyncRequest, credential: Option<&Credential>) -> SyncOutcome {
        match self.fetch(request, credential).await {
            Ok(batch) if batch.reviews.is_empty() => {
                tracing::info!(
                    stage = self.stage().as_str(),
                    platform = %request.platform,
                    "Source returned no reviews"
                );
                SyncOutcome::Empty
            }
            Ok(batch) => {
                tracing::info!(
                    stage = self.stage().as_str(),
                    platform = %request.platform,
                    count = batch.reviews.len(),
                    "Source returned reviews"
                );
                SyncOutcome::Results(batch)
            }
            Err(e) => {
                tracing::warn!(
                    stage = self.stage().as_str(),
                    platform = %request.platform,
                    "Source failed: {}",
                    e
                );
                SyncOutcome::Failed(e.to_string())
            }
        }
    }
}

/// HTTP client shared by an adapter's requests
pub(crate) fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("Repute/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}

/// Send a request and decode a JSON body, mapping non-2xx to `SourceError::Status`
pub(crate) async fn send_json(endpoint: &str, request: RequestBuilder) -> Result<Value, SourceError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        return Err(SourceError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| SourceError::Payload(format!("{}: {}", endpoint, e)))
}

/// First JSON array found along the given paths
pub(crate) fn first_array<'a>(body: &'a Value, paths: &[&[&str]]) -> Option<&'a Vec<Value>> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(body, |current, segment| current.get(*segment))
            .and_then(Value::as_array)
    })
}
