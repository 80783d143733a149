/// Official API adapter: Google Business Profile reviews
///
/// Three chained bearer-token lookups: accounts, then that account's
/// locations, then that location's reviews. The first account and first
/// location are always used.

use crate::{
    config::GoogleConfig,
    credentials::Credential,
    reviews::{
        normalize::{first_date, first_text, ANONYMOUS, RATING_ONLY},
        RawReview,
    },
    sources::{first_array, http_client, send_json, ReviewSource, SourceBatch, SourceError},
    sync::{SyncRequest, SyncStage},
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Connected-account key the OAuth callback stores Google tokens under
pub const CREDENTIAL_PLATFORM: &str = "google";

const TRANSLATED_MARKER: &str = "(Translated by Google)";
const ORIGINAL_MARKER: &str = "(Original)";

/// Google Business Profile source
pub struct GoogleBusinessSource {
    http: Client,
    config: GoogleConfig,
}

impl GoogleBusinessSource {
    pub fn new(config: GoogleConfig, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            config,
        })
    }

    async fn get(&self, endpoint: &str, url: String, token: &str) -> Result<Value, SourceError> {
        send_json(endpoint, self.http.get(url).bearer_auth(token)).await
    }
}

/// Map the `starRating` enum to a number
pub fn star_rating(value: &str) -> Option<f64> {
    match value {
        "ONE" => Some(1.0),
        "TWO" => Some(2.0),
        "THREE" => Some(3.0),
        "FOUR" => Some(4.0),
        "FIVE" => Some(5.0),
        _ => None,
    }
}

/// Keep the reviewer's original words when Google appended a translation
fn original_comment(comment: &str) -> &str {
    if let Some((_, original)) = comment.split_once(ORIGINAL_MARKER) {
        original.trim()
    } else if let Some((original, _)) = comment.split_once(TRANSLATED_MARKER) {
        original.trim()
    } else {
        comment.trim()
    }
}

/// Normalize one entry of the `reviews` array
pub fn normalize_review(item: &Value) -> RawReview {
    let rating = item
        .get("starRating")
        .and_then(Value::as_str)
        .and_then(star_rating);

    let content = first_text(item, &[&["comment"]])
        .map(|c| original_comment(&c).to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| RATING_ONLY.to_string());

    let author = first_text(item, &[&["reviewer", "displayName"], &["reviewer", "name"]])
        .unwrap_or_else(|| ANONYMOUS.to_string());

    let created_at =
        first_date(item, &[&["createTime"], &["updateTime"]]).unwrap_or_else(Utc::now);

    RawReview::new(rating, content, author, None, created_at)
}

#[async_trait]
impl ReviewSource for GoogleBusinessSource {
    fn stage(&self) -> SyncStage {
        SyncStage::OfficialApi
    }

    fn applies_to(&self, request: &SyncRequest) -> bool {
        request.use_token && request.platform.contains("google")
    }

    fn credential_platform(&self) -> Option<&'static str> {
        Some(CREDENTIAL_PLATFORM)
    }

    async fn fetch(
        &self,
        _request: &SyncRequest,
        credential: Option<&Credential>,
    ) -> Result<SourceBatch, SourceError> {
        let token = credential
            .and_then(|c| c.access_token.as_deref())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SourceError::NotConfigured("no Google access token".to_string()))?;

        let accounts = self
            .get(
                "accounts",
                format!("{}/accounts", self.config.accounts_api_url),
                token,
            )
            .await?;
        let account = first_text(&accounts, &[&["accounts", "0", "name"]])
            .ok_or_else(|| SourceError::NoMatch("no Business Profile accounts".to_string()))?;

        let locations = self
            .get(
                "locations",
                format!(
                    "{}/{}/locations?readMask=name,title",
                    self.config.locations_api_url, account
                ),
                token,
            )
            .await?;
        let location = first_text(&locations, &[&["locations", "0", "name"]])
            .ok_or_else(|| SourceError::NoMatch(format!("no locations under {}", account)))?;
        let title = first_text(&locations, &[&["locations", "0", "title"]]);

        tracing::debug!(%account, %location, "Resolved Business Profile location");

        let body = self
            .get(
                "reviews",
                format!(
                    "{}/{}/{}/reviews?pageSize=50",
                    self.config.reviews_api_url, account, location
                ),
                token,
            )
            .await?;

        let reviews = first_array(&body, &[&["reviews"]])
            .map(|items| items.iter().map(normalize_review).collect())
            .unwrap_or_default();

        Ok(SourceBatch {
            reviews,
            label: title,
            provider_account_id: Some(account),
        })
    }
}
