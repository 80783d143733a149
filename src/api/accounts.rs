/// Connected accounts and the Google OAuth connect flow
use crate::{
    auth::SessionUser,
    context::AppContext,
    credentials::CredentialUpdate,
    db::{models::ConnectedAccount, users},
    error::{AppError, AppResult},
    sources::google::CREDENTIAL_PLATFORM as GOOGLE,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{delete, get},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;

const STATE_COOKIE: &str = "oauth_state";
const STATE_COOKIE_PATH: &str = "/oauth";

/// Query string Google appends to the callback
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/accounts/:platform", delete(disconnect_account))
        .route("/oauth/google/connect", get(google_connect))
        .route("/oauth/google/callback", get(google_callback))
}

async fn list_accounts(
    State(ctx): State<AppContext>,
    user: SessionUser,
) -> AppResult<Json<Vec<ConnectedAccount>>> {
    Ok(Json(ctx.credentials.list(&user.id).await?))
}

async fn disconnect_account(
    State(ctx): State<AppContext>,
    user: SessionUser,
    Path(platform): Path<String>,
) -> AppResult<StatusCode> {
    let platform = platform.trim().to_lowercase();
    if !ctx.credentials.delete(&user.id, &platform).await? {
        return Err(AppError::NotFound("Connected account".to_string()));
    }

    tracing::info!(user = %user.id, %platform, "Account disconnected");
    Ok(StatusCode::NO_CONTENT)
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn state_cookie(value: String) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE, value))
        .path(STATE_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Send the browser to Google's consent screen
async fn google_connect(
    State(ctx): State<AppContext>,
    _user: SessionUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    if !ctx.oauth.is_configured() {
        return Err(AppError::Validation("Google OAuth is not configured".to_string()));
    }

    let state = random_state();
    let url = ctx.oauth.authorization_url(&state)?;

    Ok((jar.add(state_cookie(state)), Redirect::to(&url)))
}

/// Finish the consent flow: check state, exchange the code, store tokens
async fn google_callback(
    State(ctx): State<AppContext>,
    user: SessionUser,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> AppResult<(CookieJar, Redirect)> {
    let expected = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(state_cookie(String::new()));
    let dashboard = &ctx.config.service.dashboard_url;

    if let Some(error) = params.error {
        tracing::warn!(user = %user.id, %error, "Google consent was not granted");
        let target = format!("{}?error={}", dashboard, urlencoding::encode(&error));
        return Ok((jar, Redirect::to(&target)));
    }

    match (expected.as_deref(), params.state.as_deref()) {
        (Some(expected), Some(received)) if !expected.is_empty() && expected == received => {}
        _ => return Err(AppError::Validation("Invalid OAuth state".to_string())),
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;

    let grant = ctx.oauth.exchange_code(&code).await?;

    users::ensure_user(&ctx.db, &user.id, user.name.as_deref(), user.email.as_deref()).await?;
    ctx.credentials
        .upsert(
            &user.id,
            GOOGLE,
            &CredentialUpdate {
                access_token: Some(grant.access_token.clone()),
                refresh_token: grant.refresh_token.clone(),
                expires_at: grant.expires_at(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

    tracing::info!(
        user = %user.id,
        has_refresh_token = grant.refresh_token.is_some(),
        "Google account connected"
    );

    Ok((jar, Redirect::to(&format!("{}?connected={}", dashboard, GOOGLE))))
}
