/// OAuth token handling for the Google Business Profile integration
///
/// Covers the two token endpoint grants this service needs: the
/// authorization-code exchange at connect time and refresh-token exchange
/// when a stored access token is about to expire.

use crate::config::GoogleConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scope required to read and reply to Business Profile reviews
pub const BUSINESS_SCOPE: &str = "https://www.googleapis.com/auth/business.manage";

/// Errors from the provider token endpoint
#[derive(Debug, Error)]
pub enum TokenRefreshError {
    /// Client id/secret missing from configuration
    #[error("OAuth client is not configured")]
    NotConfigured,

    /// Nothing to exchange
    #[error("No refresh token stored")]
    MissingRefreshToken,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx from the token endpoint
    #[error("Token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx body without an access token
    #[error("Token response missing access_token")]
    MissingAccessToken,
}

/// Successful token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Only issued on first consent
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenGrant {
    /// Absolute expiry in epoch millis
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_in
            .map(|secs| (now + Duration::seconds(secs)).timestamp_millis())
    }
}

/// Exchanges a refresh token for a fresh access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TokenRefreshError>;
}

/// True once `now` is within `margin` of `expires_at` (epoch millis).
/// Tokens without a recorded expiry are treated as fresh.
pub fn needs_refresh(expires_at: Option<i64>, now: DateTime<Utc>, margin: Duration) -> bool {
    match expires_at {
        Some(expires_at) => now.timestamp_millis() >= expires_at - margin.num_milliseconds(),
        None => false,
    }
}

/// Google OAuth client
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    config: GoogleConfig,
}

impl OAuthClient {
    /// Create a new OAuth client
    pub fn new(config: GoogleConfig, timeout: std::time::Duration) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    /// Client credentials are available
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Consent URL that asks for offline access so a refresh token is issued
    pub fn authorization_url(&self, state: &str) -> Result<String, TokenRefreshError> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or(TokenRefreshError::NotConfigured)?;

        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.config.auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(BUSINESS_SCOPE),
            urlencoding::encode(state),
        ))
    }

    /// Exchange an authorization code from the consent redirect
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, TokenRefreshError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    /// POST to the token endpoint with client credentials added
    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenGrant, TokenRefreshError> {
        let (client_id, client_secret) = match (&self.config.client_id, &self.config.client_secret) {
            (Some(id), Some(secret)) => (id.as_str(), secret.as_str()),
            _ => return Err(TokenRefreshError::NotConfigured),
        };

        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        form.extend_from_slice(params);

        let response = self
            .http
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenRefreshError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await?;
        if body
            .get("access_token")
            .and_then(|v| v.as_str())
            .map_or(true, str::is_empty)
        {
            return Err(TokenRefreshError::MissingAccessToken);
        }

        serde_json::from_value(body).map_err(|_| TokenRefreshError::MissingAccessToken)
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TokenRefreshError> {
        if refresh_token.is_empty() {
            return Err(TokenRefreshError::MissingRefreshToken);
        }

        let grant = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;

        tracing::info!("Refreshed OAuth access token");

        Ok(grant)
    }
}
