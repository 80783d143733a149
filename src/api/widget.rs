/// Public review widget
use crate::{context::AppContext, error::AppResult, reviews::store::WidgetPayload};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WidgetParams {
    pub limit: Option<i64>,
}

pub fn routes() -> Router<AppContext> {
    Router::new().route("/widget/:user_id", get(widget))
}

/// No session required; embedded on the business's own site
async fn widget(
    State(ctx): State<AppContext>,
    Path(user_id): Path<String>,
    Query(params): Query<WidgetParams>,
) -> AppResult<impl IntoResponse> {
    let payload: WidgetPayload = ctx
        .reviews
        .public_widget(&user_id, params.limit.unwrap_or(10))
        .await?;

    Ok((
        [(header::CACHE_CONTROL, "public, max-age=300")],
        Json(payload),
    ))
}
