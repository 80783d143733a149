/// Review persistence, aggregate statistics, and replies
use crate::{
    db::models::Review,
    error::{AppError, AppResult},
    reviews::{RawReview, ReviewOrigin, Sentiment},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use uuid::Uuid;

const REVIEW_COLUMNS: &str = "id, user_id, platform, source, rating, content, author_name, \
     sentiment, created_at, admin_reply, ai_reply, replied_at";

/// Longest reply accepted from the dashboard
pub const MAX_REPLY_LEN: usize = 4096;

#[derive(Debug, Clone, Copy)]
enum ReplyKind {
    /// Sent by the business owner
    Owner,
    /// AI suggestion awaiting the owner
    Draft,
}

/// Insert a normalized review, ignoring duplicates on
/// `(user_id, platform, author_name, content)`. Returns true when a row was added.
pub async fn insert_with<'e, E>(
    executor: E,
    user_id: &str,
    platform: &str,
    origin: ReviewOrigin,
    review: &RawReview,
) -> AppResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO reviews
            (id, user_id, platform, source, rating, content, author_name, sentiment, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(user_id, platform, author_name, content) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(platform)
    .bind(origin.as_str())
    .bind(review.rating)
    .bind(&review.content)
    .bind(&review.author)
    .bind(review.sentiment.as_str())
    .bind(review.created_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Dashboard list filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewFilter {
    pub platform: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Manually entered review
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub platform: String,
    pub rating: f64,
    pub content: String,
    #[serde(alias = "author_name")]
    pub author_name: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Sentiment counts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentimentBreakdown {
    pub positive: i64,
    pub neutral: i64,
    pub negative: i64,
}

/// Per-platform aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub platform: String,
    pub count: i64,
    pub average_rating: f64,
}

/// Aggregate statistics for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub total: i64,
    pub average_rating: f64,
    pub sentiment: SentimentBreakdown,
    pub platforms: Vec<PlatformStats>,
    pub awaiting_reply: i64,
}

/// Review as shown in the embeddable widget
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetReview {
    pub platform: String,
    pub rating: f64,
    pub content: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

/// Public widget payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPayload {
    pub business_name: Option<String>,
    pub average_rating: f64,
    pub total: i64,
    pub reviews: Vec<WidgetReview>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Review store service
#[derive(Clone)]
pub struct ReviewStore {
    db: SqlitePool,
}

impl ReviewStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Newest-first listing scoped to one user
    pub async fn list(&self, user_id: &str, filter: &ReviewFilter) -> AppResult<Vec<Review>> {
        let limit = filter.limit.unwrap_or(50).clamp(1, 200);
        let offset = filter.offset.unwrap_or(0).max(0);
        let platform = filter.platform.as_deref().map(str::to_lowercase);

        let reviews = sqlx::query_as::<_, Review>(&format!(
            r#"
            SELECT {}
            FROM reviews
            WHERE user_id = ?1
              AND (?2 IS NULL OR platform = ?2)
              AND (?3 IS NULL OR sentiment = ?3)
            ORDER BY created_at DESC
            LIMIT ?4 OFFSET ?5
            "#,
            REVIEW_COLUMNS
        ))
        .bind(user_id)
        .bind(platform)
        .bind(filter.sentiment.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(reviews)
    }

    /// Fetch one review owned by the user
    pub async fn get(&self, user_id: &str, id: &str) -> AppResult<Review> {
        sqlx::query_as::<_, Review>(&format!(
            "SELECT {} FROM reviews WHERE id = ?1 AND user_id = ?2",
            REVIEW_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Review".to_string()))
    }

    /// Aggregate statistics
    pub async fn stats(&self, user_id: &str) -> AppResult<ReviewStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                AVG(rating) AS average_rating,
                COALESCE(SUM(CASE WHEN sentiment = 'positive' THEN 1 ELSE 0 END), 0) AS positive,
                COALESCE(SUM(CASE WHEN sentiment = 'neutral' THEN 1 ELSE 0 END), 0) AS neutral,
                COALESCE(SUM(CASE WHEN sentiment = 'negative' THEN 1 ELSE 0 END), 0) AS negative,
                COALESCE(SUM(CASE WHEN admin_reply IS NULL THEN 1 ELSE 0 END), 0) AS awaiting_reply
            FROM reviews
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        let platform_rows = sqlx::query(
            r#"
            SELECT platform, COUNT(*) AS count, AVG(rating) AS average_rating
            FROM reviews
            WHERE user_id = ?1
            GROUP BY platform
            ORDER BY count DESC, platform
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let platforms = platform_rows
            .iter()
            .map(|row| {
                Ok(PlatformStats {
                    platform: row.try_get("platform")?,
                    count: row.try_get("count")?,
                    average_rating: round2(row.try_get::<Option<f64>, _>("average_rating")?.unwrap_or(0.0)),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(ReviewStats {
            total: row.try_get("total")?,
            average_rating: round2(row.try_get::<Option<f64>, _>("average_rating")?.unwrap_or(0.0)),
            sentiment: SentimentBreakdown {
                positive: row.try_get("positive")?,
                neutral: row.try_get("neutral")?,
                negative: row.try_get("negative")?,
            },
            platforms,
            awaiting_reply: row.try_get("awaiting_reply")?,
        })
    }

    /// Manual entry from the dashboard. The user row must already exist.
    pub async fn create_manual(&self, user_id: &str, input: NewReview) -> AppResult<Review> {
        let platform = input.platform.trim().to_lowercase();
        if platform.is_empty() {
            return Err(AppError::Validation("platform is required".to_string()));
        }
        if !(1.0..=5.0).contains(&input.rating) {
            return Err(AppError::Validation("rating must be between 1 and 5".to_string()));
        }
        let content = input.content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::Validation("content is required".to_string()));
        }

        let author = input
            .author_name
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| super::normalize::ANONYMOUS.to_string());

        let review = RawReview::new(
            Some(input.rating),
            content,
            author,
            None,
            input.created_at.unwrap_or_else(Utc::now),
        );

        if !insert_with(&self.db, user_id, &platform, ReviewOrigin::Manual, &review).await? {
            return Err(AppError::Validation("An identical review already exists".to_string()));
        }

        let stored = sqlx::query_as::<_, Review>(&format!(
            "SELECT {} FROM reviews WHERE user_id = ?1 AND platform = ?2 AND author_name = ?3 AND content = ?4",
            REVIEW_COLUMNS
        ))
        .bind(user_id)
        .bind(&platform)
        .bind(&review.author)
        .bind(&review.content)
        .fetch_one(&self.db)
        .await?;

        Ok(stored)
    }

    /// Attach the business owner's reply
    pub async fn set_admin_reply(&self, user_id: &str, id: &str, reply: &str) -> AppResult<Review> {
        self.set_reply(ReplyKind::Owner, user_id, id, reply).await
    }

    /// Attach an AI-drafted reply; `replied_at` is left as is
    pub async fn set_ai_reply(&self, user_id: &str, id: &str, reply: &str) -> AppResult<Review> {
        self.set_reply(ReplyKind::Draft, user_id, id, reply).await
    }

    async fn set_reply(&self, kind: ReplyKind, user_id: &str, id: &str, reply: &str) -> AppResult<Review> {
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(AppError::Validation("reply cannot be empty".to_string()));
        }
        if reply.chars().count() > MAX_REPLY_LEN {
            return Err(AppError::Validation(format!(
                "reply cannot exceed {} characters",
                MAX_REPLY_LEN
            )));
        }

        let query = match kind {
            ReplyKind::Owner => sqlx::query(
                "UPDATE reviews SET admin_reply = ?1, replied_at = ?2 WHERE id = ?3 AND user_id = ?4",
            )
            .bind(reply)
            .bind(Utc::now()),
            ReplyKind::Draft => {
                sqlx::query("UPDATE reviews SET ai_reply = ?1 WHERE id = ?2 AND user_id = ?3")
                    .bind(reply)
            }
        };
        let result = query.bind(id).bind(user_id).execute(&self.db).await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Review".to_string()));
        }

        self.get(user_id, id).await
    }

    /// Delete one review owned by the user
    pub async fn delete(&self, user_id: &str, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Review".to_string()));
        }

        Ok(())
    }

    /// Public payload for the embeddable widget: positive reviews only
    pub async fn public_widget(&self, user_id: &str, limit: i64) -> AppResult<WidgetPayload> {
        let business_name = crate::db::users::get_user(&self.db, user_id)
            .await?
            .and_then(|u| u.name);

        let stats = self.stats(user_id).await?;

        let reviews = sqlx::query_as::<_, Review>(&format!(
            r#"
            SELECT {}
            FROM reviews
            WHERE user_id = ?1 AND rating >= 4
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
            REVIEW_COLUMNS
        ))
        .bind(user_id)
        .bind(limit.clamp(1, 50))
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|r| WidgetReview {
            platform: r.platform,
            rating: r.rating,
            content: r.content,
            author_name: r.author_name,
            created_at: r.created_at,
        })
        .collect();

        Ok(WidgetPayload {
            business_name,
            average_rating: stats.average_rating,
            total: stats.total,
            reviews,
        })
    }
}
