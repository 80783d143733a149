/// Scraper adapter: Apify-style actor runs
///
/// A run is submitted synchronously (`waitForFinish`) and its default
/// dataset is read back once the run reports `SUCCEEDED`.

use crate::{
    config::ScraperConfig,
    credentials::Credential,
    reviews::{
        normalize::{
            compose_content, first_date, first_number, first_text, ContentPart, FieldPath,
            ANONYMOUS,
        },
        RawReview, Sentiment,
    },
    sources::{first_array, http_client, send_json, ReviewSource, SourceBatch, SourceError},
    sync::{SyncRequest, SyncStage},
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// How an actor expects to receive the target URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    /// `{ "startUrls": [{ "url": … }] }`
    StartUrls,
    /// `{ "urls": [ … ] }`
    DirectUrls,
    /// `{ "url": … }`
    SingleUrl,
}

/// Actor parameters for one platform family
#[derive(Debug, Clone, Copy)]
pub struct ScraperJob {
    /// Matched as a substring of the platform id
    pub key: &'static str,
    pub actor: &'static str,
    pub input: InputShape,
    /// Input field carrying the item cap
    pub limit_key: &'static str,
}

const JOBS: &[ScraperJob] = &[
    ScraperJob {
        key: "google",
        actor: "compass~google-maps-reviews-scraper",
        input: InputShape::StartUrls,
        limit_key: "maxReviews",
    },
    ScraperJob {
        key: "tripadvisor",
        actor: "maxcopell~tripadvisor-reviews",
        input: InputShape::StartUrls,
        limit_key: "maxItemsPerQuery",
    },
    ScraperJob {
        key: "yelp",
        actor: "tri_angle~yelp-review-scraper",
        input: InputShape::DirectUrls,
        limit_key: "maxReviewsPerBusiness",
    },
    ScraperJob {
        key: "trustpilot",
        actor: "casper11515~trustpilot-reviews-scraper",
        input: InputShape::SingleUrl,
        limit_key: "maxReviews",
    },
    ScraperJob {
        key: "booking",
        actor: "voyager~booking-reviews-scraper",
        input: InputShape::StartUrls,
        limit_key: "maxReviewsPerHotel",
    },
    ScraperJob {
        key: "facebook",
        actor: "apify~facebook-reviews-scraper",
        input: InputShape::StartUrls,
        limit_key: "resultsLimit",
    },
];

/// Job for a platform id such as `google_maps` or `yelp`
pub fn job_for(platform: &str) -> Option<&'static ScraperJob> {
    let platform = platform.to_ascii_lowercase();
    JOBS.iter().find(|job| platform.contains(job.key))
}

impl ScraperJob {
    /// Actor input for `url`, capped at `max_items`
    pub fn input_for(&self, url: &str, max_items: u32) -> Value {
        let mut input = match self.input {
            InputShape::StartUrls => json!({ "startUrls": [{ "url": url }] }),
            InputShape::DirectUrls => json!({ "urls": [url] }),
            InputShape::SingleUrl => json!({ "url": url }),
        };
        input[self.limit_key] = json!(max_items);
        input
    }
}

const RATING_PATHS: &[FieldPath] = &[
    &["stars"],
    &["rating"],
    &["reviewRating"],
    &["rating", "value"],
    &["reviewScore"],
    &["score"],
];

const TITLE_PATHS: &[FieldPath] = &[&["title"], &["reviewTitle"]];

const TEXT_PATHS: &[FieldPath] = &[
    &["text"],
    &["reviewText"],
    &["review"],
    &["content"],
    &["body"],
    &["textTranslated"],
];

const AUTHOR_PATHS: &[FieldPath] = &[
    &["name"],
    &["reviewerName"],
    &["userName"],
    &["author"],
    &["author", "name"],
    &["user", "name"],
    &["reviewer", "name"],
    &["consumer", "displayName"],
];

const DATE_PATHS: &[FieldPath] = &[
    &["publishedAtDate"],
    &["publishedDate"],
    &["reviewDate"],
    &["date"],
    &["createdAt"],
    &["dates", "publishedDate"],
];

/// Normalize one dataset item. Items with neither a rating nor any text are dropped.
pub fn normalize_item(item: &Value) -> Option<RawReview> {
    let rating = first_number(item, RATING_PATHS).or_else(|| {
        item.get("isRecommended")
            .and_then(Value::as_bool)
            .map(|recommended| if recommended { 5.0 } else { 1.0 })
    });

    let title = first_text(item, TITLE_PATHS).unwrap_or_default();
    let text = first_text(item, TEXT_PATHS).unwrap_or_default();
    let liked = first_text(item, &[&["likedText"]]).unwrap_or_default();
    let disliked = first_text(item, &[&["dislikedText"]]).unwrap_or_default();

    if rating.is_none() && [&title, &text, &liked, &disliked].iter().all(|s| s.is_empty()) {
        return None;
    }

    let content = compose_content(&[
        ContentPart::Title(&title),
        ContentPart::Pros(&liked),
        ContentPart::Cons(&disliked),
        ContentPart::Text(&text),
    ]);

    let sentiment = first_text(item, &[&["sentiment"], &["sentimentLabel"]])
        .and_then(|s| s.parse::<Sentiment>().ok());

    Some(RawReview::new(
        rating,
        content,
        first_text(item, AUTHOR_PATHS).unwrap_or_else(|| ANONYMOUS.to_string()),
        sentiment,
        first_date(item, DATE_PATHS).unwrap_or_else(Utc::now),
    ))
}

/// Apify-compatible scraping source
pub struct ScraperSource {
    http: Client,
    config: ScraperConfig,
}

impl ScraperSource {
    pub fn new(config: ScraperConfig, timeout: Duration) -> reqwest::Result<Self> {
        // A synchronous run can outlast the normal request timeout
        let timeout = timeout.max(Duration::from_secs(config.wait_for_finish_secs + 10));
        Ok(Self {
            http: http_client(timeout)?,
            config,
        })
    }
}

#[async_trait]
impl ReviewSource for ScraperSource {
    fn stage(&self) -> SyncStage {
        SyncStage::Scraper
    }

    fn applies_to(&self, request: &SyncRequest) -> bool {
        self.config.api_token.is_some()
            && request.locator.is_some()
            && job_for(&request.platform).is_some()
    }

    async fn fetch(
        &self,
        request: &SyncRequest,
        _credential: Option<&Credential>,
    ) -> Result<SourceBatch, SourceError> {
        let token = self
            .config
            .api_token
            .as_deref()
            .ok_or_else(|| SourceError::NotConfigured("scraper token missing".to_string()))?;
        let url = request.locator.as_deref().ok_or(SourceError::MissingLocator)?;
        let job = job_for(&request.platform)
            .ok_or_else(|| SourceError::NoMatch(format!("no scraper for {}", request.platform)))?;

        tracing::debug!(actor = job.actor, %url, "Starting scraper run");

        let run = send_json(
            "actor run",
            self.http
                .post(format!(
                    "{}/acts/{}/runs?token={}&waitForFinish={}",
                    self.config.api_url,
                    job.actor,
                    urlencoding::encode(token),
                    self.config.wait_for_finish_secs
                ))
                .json(&job.input_for(url, self.config.max_items)),
        )
        .await?;

        let status = first_text(&run, &[&["data", "status"]]).unwrap_or_default();
        if status != "SUCCEEDED" {
            return Err(SourceError::Payload(format!(
                "run {} finished with status '{}'",
                job.actor, status
            )));
        }

        let dataset = first_text(&run, &[&["data", "defaultDatasetId"]])
            .ok_or_else(|| SourceError::Payload("run without defaultDatasetId".to_string()))?;

        let items = send_json(
            "dataset items",
            self.http.get(format!(
                "{}/datasets/{}/items?token={}&clean=true",
                self.config.api_url,
                dataset,
                urlencoding::encode(token)
            )),
        )
        .await?;

        let reviews = match &items {
            Value::Array(list) => list.iter().filter_map(normalize_item).collect(),
            other => first_array(other, &[&["items"], &["data"]])
                .map(|list| list.iter().filter_map(normalize_item).collect())
                .unwrap_or_default(),
        };

        Ok(SourceBatch {
            reviews,
            label: None,
            provider_account_id: None,
        })
    }
}
