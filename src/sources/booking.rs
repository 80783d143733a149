/// Paid API adapter: Booking.com reviews through RapidAPI

use crate::{
    config::BookingConfig,
    credentials::Credential,
    reviews::{
        normalize::{compose_content, first_date, first_number, first_text, ContentPart, ANONYMOUS},
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

/// Booking.com review source
pub struct BookingSource {
    http: Client,
    config: BookingConfig,
}

impl BookingSource {
    pub fn new(config: BookingConfig, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            config,
        })
    }

    fn api_key(&self) -> Result<&str, SourceError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| SourceError::NotConfigured("RapidAPI key missing".to_string()))
    }

    async fn get(&self, endpoint: &str, path_and_query: String) -> Result<Value, SourceError> {
        let request = self
            .http
            .get(format!("{}{}", self.config.api_url, path_and_query))
            .header("x-rapidapi-key", self.api_key()?)
            .header("x-rapidapi-host", &self.config.api_host);
        send_json(endpoint, request).await
    }

    /// Resolve a hotel name to Booking's numeric id, preferring hotel hits
    async fn search_hotel_id(&self, name: &str) -> Result<String, SourceError> {
        let body = self
            .get(
                "searchDestination",
                format!(
                    "/api/v1/hotels/searchDestination?query={}",
                    urlencoding::encode(name)
                ),
            )
            .await?;

        let hits = first_array(&body, &[&["data"]])
            .ok_or_else(|| SourceError::Payload("searchDestination without data".to_string()))?;

        let hit = hits
            .iter()
            .find(|h| h.get("dest_type").and_then(Value::as_str) == Some("hotel"))
            .or_else(|| hits.first())
            .ok_or_else(|| SourceError::NoMatch(format!("no destination for '{}'", name)))?;

        match hit.get("dest_id") {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(SourceError::Payload("destination without dest_id".to_string())),
        }
    }
}

/// Hotel name from a Booking.com URL slug.
///
/// `https://www.booking.com/hotel/us/the-plaza.en-gb.html` gives `the plaza`.
pub fn extract_hotel_name(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let (_, after) = path.split_once("/hotel/")?;
    let slug = after.trim_end_matches('/').rsplit('/').next()?;
    let stem = slug.split('.').next()?;

    let name = stem.replace(['-', '_'], " ").trim().to_string();
    (!name.is_empty()).then_some(name)
}

fn is_hotel_id(locator: &str) -> bool {
    !locator.is_empty() && locator.chars().all(|c| c.is_ascii_digit())
}

/// Normalize one entry of the getHotelReviews result
pub fn normalize_review(item: &Value) -> RawReview {
    let title = first_text(item, &[&["title"]]).unwrap_or_default();
    let pros = first_text(item, &[&["pros"]]).unwrap_or_default();
    let cons = first_text(item, &[&["cons"]]).unwrap_or_default();

    let content = compose_content(&[
        ContentPart::Title(&title),
        ContentPart::Pros(&pros),
        ContentPart::Cons(&cons),
    ]);

    let author = first_text(item, &[&["author", "name"], &["author_name"], &["reviewer_name"]])
        .unwrap_or_else(|| ANONYMOUS.to_string());

    RawReview::new(
        first_number(item, &[&["average_score"], &["score"]]),
        content,
        author,
        None,
        first_date(item, &[&["date"], &["review_date"]]).unwrap_or_else(Utc::now),
    )
}

#[async_trait]
impl ReviewSource for BookingSource {
    fn stage(&self) -> SyncStage {
        SyncStage::PaidApi
    }

    fn applies_to(&self, request: &SyncRequest) -> bool {
        request.platform.contains("booking")
            && self.config.api_key.is_some()
            && request.locator.is_some()
    }

    async fn fetch(
        &self,
        request: &SyncRequest,
        _credential: Option<&Credential>,
    ) -> Result<SourceBatch, SourceError> {
        let locator = request.locator.as_deref().ok_or(SourceError::MissingLocator)?;

        let hotel_id = if is_hotel_id(locator) {
            locator.to_string()
        } else {
            let name = extract_hotel_name(locator).unwrap_or_else(|| locator.to_string());
            self.search_hotel_id(&name).await?
        };

        tracing::debug!(%hotel_id, "Fetching Booking.com reviews");

        let body = self
            .get(
                "getHotelReviews",
                format!(
                    "/api/v1/hotels/getHotelReviews?hotel_id={}&languagecode=en-us&page_number=1",
                    urlencoding::encode(&hotel_id)
                ),
            )
            .await?;

        let reviews = first_array(&body, &[&["data", "result"], &["result"], &["data"]])
            .map(|items| items.iter().map(normalize_review).collect())
            .unwrap_or_default();

        Ok(SourceBatch {
            reviews,
            label: None,
            provider_account_id: Some(hotel_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::testing::config_with_base_url, testing::spawn_stub};
    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    fn booking_stub(searches: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/booking/api/v1/hotels/searchDestination",
                get(move |Query(q): Query<HashMap<String, String>>| {
                    let searches = searches.clone();
                    async move {
                        searches.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(q.get("query").map(String::as_str), Some("the plaza"));
                        Json(json!({
                            "status": true,
                            "data": [
                                { "dest_id": "-2601889", "dest_type": "city", "name": "New York" },
                                { "dest_id": "5936336", "dest_type": "hotel", "name": "The Plaza" }
                            ]
                        }))
                    }
                }),
            )
            .route(
                "/booking/api/v1/hotels/getHotelReviews",
                get(
                    |headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                        if headers.get("x-rapidapi-key").and_then(|h| h.to_str().ok())
                            != Some("rapid-key")
                        {
                            return Err(StatusCode::FORBIDDEN);
                        }
                        assert_eq!(q.get("hotel_id").map(String::as_str), Some("5936336"));
                        Ok(Json(json!({
                            "status": true,
                            "data": {
                                "result": [
                                    {
                                        "average_score": 9.0,
                                        "title": "Wonderful",
                                        "pros": "Location",
                                        "cons": "Pricey breakfast",
                                        "author": { "name": "Priya" },
                                        "date": "2024-03-02 10:15:00"
                                    },
                                    { "average_score": 4, "pros": "Quiet room" }
                                ]
                            }
                        })))
                    },
                ),
            )
    }

    fn source(base_url: &str) -> BookingSource {
        BookingSource::new(config_with_base_url(base_url).booking, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_extract_hotel_name() {
        assert_eq!(
            extract_hotel_name("https://www.booking.com/hotel/us/the-plaza.en-gb.html").as_deref(),
            Some("the plaza")
        );
        assert_eq!(
            extract_hotel_name("https://www.booking.com/hotel/fr/le_grand.html?aid=1").as_deref(),
            Some("le grand")
        );
        assert!(extract_hotel_name("https://www.booking.com/searchresults.html").is_none());
    }

    #[test]
    fn test_normalize_review_halves_ten_point_score() {
        let review = normalize_review(&json!({
            "average_score": 8.0,
            "title": "Great stay",
            "author": { "name": "Sam" }
        }));
        assert_eq!(review.rating, 4.0);
        assert_eq!(review.content, "Great stay");
        assert_eq!(review.author, "Sam");
    }

    #[test]
    fn test_applies_requires_key_and_locator() {
        let source = source("http://127.0.0.1:1");
        assert!(source.applies_to(&SyncRequest::new("booking", Some("5936336"), false)));
        assert!(!source.applies_to(&SyncRequest::new("booking", None, false)));
        assert!(!source.applies_to(&SyncRequest::new("yelp", Some("5936336"), false)));

        let mut config = config_with_base_url("http://127.0.0.1:1").booking;
        config.api_key = None;
        let keyless = BookingSource::new(config, Duration::from_secs(5)).unwrap();
        assert!(!keyless.applies_to(&SyncRequest::new("booking", Some("5936336"), false)));
    }

    #[tokio::test]
    async fn test_fetch_resolves_hotel_from_url() {
        let searches = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_stub(booking_stub(searches.clone())).await;
        let request = SyncRequest::new(
            "booking",
            Some("https://www.booking.com/hotel/us/the-plaza.en-gb.html"),
            false,
        );

        let batch = source(&base_url).fetch(&request, None).await.unwrap();

        assert_eq!(searches.load(Ordering::SeqCst), 1);
        assert_eq!(batch.provider_account_id.as_deref(), Some("5936336"));
        assert_eq!(batch.reviews.len(), 2);

        let first = &batch.reviews[0];
        assert_eq!(first.rating, 4.5);
        assert_eq!(first.author, "Priya");
        assert_eq!(first.content, "Wonderful\n👍 Location\n👎 Pricey breakfast");
        assert_eq!(first.created_at.to_rfc3339(), "2024-03-02T10:15:00+00:00");

        let second = &batch.reviews[1];
        assert_eq!(second.rating, 4.0);
        assert_eq!(second.content, "Quiet room");
        assert_eq!(second.author, "Anonymous");
    }

    #[tokio::test]
    async fn test_numeric_locator_skips_search() {
        let searches = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_stub(booking_stub(searches.clone())).await;
        let request = SyncRequest::new("booking", Some("5936336"), false);

        let batch = source(&base_url).fetch(&request, None).await.unwrap();

        assert_eq!(searches.load(Ordering::SeqCst), 0);
        assert_eq!(batch.reviews.len(), 2);
    }
}
