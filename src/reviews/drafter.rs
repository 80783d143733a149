/// Reply drafting: an OpenAI-compatible chat completion when a key is
/// configured, otherwise a sentiment-keyed template
use crate::{config::AiConfig, db::models::Review, reviews::Sentiment};
use reqwest::Client;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const SYSTEM_PROMPT: &str = "You write replies to customer reviews on behalf of a business. \
Keep replies under 80 words, warm and professional. Thank the reviewer, address specific \
points they raise, and never invent facts, discounts, or promises.";

/// Why an AI completion could not be used
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion endpoint returned status {0}")]
    Status(u16),

    #[error("completion response had no content")]
    EmptyCompletion,
}

/// Reply drafter
#[derive(Clone)]
pub struct ReplyDrafter {
    http: Client,
    config: AiConfig,
}

impl ReplyDrafter {
    pub fn new(config: AiConfig, timeout: Duration) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    /// Draft a reply. Never fails: AI errors fall back to the template.
    pub async fn draft(&self, review: &Review, business_name: Option<&str>) -> String {
        if let Some(api_key) = self.config.api_key.as_deref() {
            match self.complete(api_key, review, business_name).await {
                Ok(reply) => return reply,
                Err(e) => tracing::warn!("AI reply drafting failed, using template: {}", e),
            }
        }

        template_reply(review, business_name)
    }

    async fn complete(
        &self,
        api_key: &str,
        review: &Review,
        business_name: Option<&str>,
    ) -> Result<String, DraftError> {
        let prompt = format!(
            "Business: {}\nPlatform: {}\nRating: {}/5\nReviewer: {}\nReview:\n{}",
            business_name.unwrap_or("our business"),
            review.platform,
            review.rating,
            review.author_name,
            review.content
        );

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.api_url))
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.config.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": prompt }
                ],
                "max_tokens": 200,
                "temperature": 0.7
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DraftError::Status(response.status().as_u16()));
        }

        let body: Value = response.json().await?;
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(DraftError::EmptyCompletion)
    }
}

/// Deterministic reply keyed on the stored sentiment
pub fn template_reply(review: &Review, business_name: Option<&str>) -> String {
    let name = first_name(&review.author_name);
    let business = business_name.unwrap_or("us");
    let sentiment = Sentiment::from_str(&review.sentiment)
        .unwrap_or_else(|_| Sentiment::from_rating(review.rating));

    match sentiment {
        Sentiment::Positive => format!(
            "Hi {}, thank you so much for the kind words! We're thrilled you enjoyed your experience with {} and look forward to welcoming you back soon.",
            name, business
        ),
        Sentiment::Neutral => format!(
            "Hi {}, thanks for taking the time to share your feedback. We're always looking to improve, and your comments help {} do better. We hope to see you again.",
            name, business
        ),
        Sentiment::Negative => format!(
            "Hi {}, we're sorry your experience didn't meet expectations. Please reach out to {} directly so we can make this right. Thank you for letting us know.",
            name, business
        ),
    }
}

fn first_name(author: &str) -> &str {
    author
        .split_whitespace()
        .next()
        .filter(|n| !n.eq_ignore_ascii_case("anonymous"))
        .unwrap_or("there")
}
