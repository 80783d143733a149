/// Database row types
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub account_type: String, // "personal" or "business"
    pub settings: String,     // JSON blob
    pub created_at: DateTime<Utc>,
}

/// Connected third-party account; tokens never leave the server
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    #[serde(skip_serializing, default)]
    pub access_token: Option<String>,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    /// Epoch millis
    pub expires_at: Option<i64>,
    pub connected_label: Option<String>,
    pub provider_account_id: Option<String>,
    pub locator: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored review
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub source: String,
    pub rating: f64,
    pub content: String,
    pub author_name: String,
    pub sentiment: String,
    pub created_at: DateTime<Utc>,
    pub admin_reply: Option<String>,
    pub ai_reply: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
}
