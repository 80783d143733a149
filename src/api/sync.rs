/// Review sync endpoint
use crate::{
    api::ApiJson,
    auth::SessionUser,
    context::AppContext,
    error::{AppError, AppResult},
    sync::{SyncRequest, SyncStage},
};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

/// Body of `POST /sync`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBody {
    pub platform: Option<String>,
    /// Profile URL or vendor id
    #[serde(default, alias = "locator")]
    pub url: Option<String>,
    #[serde(default)]
    pub use_token: Option<bool>,
}

/// Successful sync response
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub count: usize,
    pub inserted: u64,
    pub source: Option<SyncStage>,
}

pub fn routes() -> Router<AppContext> {
    Router::new().route("/sync", post(sync_reviews))
}

/// Run the source chain for the caller and store the results
pub async fn sync_reviews(
    State(ctx): State<AppContext>,
    user: SessionUser,
    ApiJson(body): ApiJson<SyncBody>,
) -> AppResult<Json<SyncResponse>> {
    let platform = body
        .platform
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("platform is required".to_string()))?;

    let request = SyncRequest::new(platform, body.url.as_deref(), body.use_token.unwrap_or(false));
    let report = ctx.orchestrator.sync(&user, &request).await?;

    Ok(Json(SyncResponse {
        success: true,
        count: report.count,
        inserted: report.inserted,
        source: report.source,
    }))
}
