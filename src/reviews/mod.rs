/// Review domain: normalized review shape, persistence, and reply drafting
///
/// Every source adapter produces `RawReview` values; the store persists them
/// and serves the dashboard, stats, and public widget.

pub mod drafter;
pub mod normalize;
pub mod store;

pub use drafter::ReplyDrafter;
pub use store::{ReviewFilter, ReviewStats, ReviewStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Review sentiment bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Default classification when the vendor supplies none
    pub fn from_rating(rating: f64) -> Self {
        if rating >= 4.0 {
            Sentiment::Positive
        } else if rating <= 2.0 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "neutral" | "mixed" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            other => Err(format!("Unknown sentiment: {}", other)),
        }
    }
}

/// Which stage of the sync produced a stored review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOrigin {
    OfficialApi,
    PaidApi,
    Scraper,
    Synthetic,
    Manual,
}

impl ReviewOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewOrigin::OfficialApi => "official_api",
            ReviewOrigin::PaidApi => "paid_api",
            ReviewOrigin::Scraper => "scraper",
            ReviewOrigin::Synthetic => "synthetic",
            ReviewOrigin::Manual => "manual",
        }
    }
}

/// Vendor-neutral review produced by a source adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReview {
    /// Always within [1, 5]
    pub rating: f64,
    pub content: String,
    pub author: String,
    pub sentiment: Sentiment,
    pub created_at: DateTime<Utc>,
}

impl RawReview {
    /// Build a review from a vendor rating, deriving sentiment when absent.
    /// The rating is scale-normalized and clamped into [1, 5].
    pub fn new(
        raw_rating: Option<f64>,
        content: String,
        author: String,
        sentiment: Option<Sentiment>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let rating = normalize::clamp_rating(
            raw_rating
                .map(normalize::normalize_rating)
                .unwrap_or(normalize::MISSING_RATING),
        );

        Self {
            rating,
            content,
            author,
            sentiment: sentiment.unwrap_or_else(|| Sentiment::from_rating(rating)),
            created_at,
        }
    }
}
