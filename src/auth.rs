/// Session authentication
///
/// Sessions are issued by the dashboard frontend as HS256 JWTs and arrive
/// either as `Authorization: Bearer …` or in the session cookie. This
/// service only verifies them.
use crate::{context::AppContext, error::AppError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a dashboard session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
}

/// Authenticated dashboard user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Bearer header first, then the session cookie
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    extract_bearer_token(headers).or_else(|| {
        CookieJar::from_headers(headers)
            .get(cookie_name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Verify a session token signature and expiry
pub fn verify_session_token(token: &str, secret: &str) -> Result<SessionUser, AppError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (1 minute)
    validation.leeway = 60;

    let data = decode::<SessionClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!("Session verification failed: {}", e);
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::Authentication("Session expired".to_string()),
            ErrorKind::InvalidSignature => {
                AppError::Authentication("Invalid session signature".to_string())
            }
            _ => AppError::Authentication(format!("Invalid session: {}", e)),
        }
    })?;

    if data.claims.sub.trim().is_empty() {
        return Err(AppError::Authentication("Session has no subject".to_string()));
    }

    Ok(SessionUser {
        id: data.claims.sub,
        name: data.claims.name,
        email: data.claims.email,
    })
}

#[async_trait]
impl FromRequestParts<AppContext> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = &state.config.authentication;
        let token = session_token(&parts.headers, &auth.session_cookie)
            .ok_or_else(|| AppError::Authentication("Missing session".to_string()))?;

        verify_session_token(&token, &auth.session_secret)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::mint_session_token;
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-session-secret-that-is-long-enough";

    #[test]
    fn test_verify_valid_session() {
        let token = mint_session_token(SECRET, "user-1", 3600);
        let user = verify_session_token(&token, SECRET).unwrap();

        assert_eq!(user.id, "user-1");
        assert_eq!(user.email.as_deref(), Some("user-1@example.com"));
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let token = mint_session_token(SECRET, "user-1", 3600);
        assert!(matches!(
            verify_session_token(&token, "another-secret-another-secret-xx"),
            Err(AppError::Authentication(_))
        ));

        let expired = mint_session_token(SECRET, "user-1", -3600);
        assert!(matches!(
            verify_session_token(&expired, SECRET),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_session_token_prefers_bearer_then_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers, "session"), None);

        headers.insert("cookie", HeaderValue::from_static("theme=dark; session=from-cookie"));
        assert_eq!(session_token(&headers, "session").as_deref(), Some("from-cookie"));

        headers.insert("authorization", HeaderValue::from_static("Bearer from-header"));
        assert_eq!(session_token(&headers, "session").as_deref(), Some("from-header"));
    }
}
