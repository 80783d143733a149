/// Review dashboard endpoints: listing, stats, manual entry, replies
use crate::{
    api::ApiJson,
    auth::SessionUser,
    context::AppContext,
    db::{models::Review, users},
    error::AppResult,
    reviews::{store::NewReview, ReviewFilter, ReviewStats},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

/// Body of `POST /reviews/:id/reply`
#[derive(Debug, Deserialize)]
pub struct ReplyBody {
    pub reply: String,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/reviews", get(list_reviews).post(create_review))
        .route("/reviews/stats", get(review_stats))
        .route("/reviews/:id", delete(delete_review))
        .route("/reviews/:id/reply", post(reply_to_review))
        .route("/reviews/:id/draft-reply", post(draft_reply))
}

async fn list_reviews(
    State(ctx): State<AppContext>,
    user: SessionUser,
    Query(filter): Query<ReviewFilter>,
) -> AppResult<Json<Vec<Review>>> {
    Ok(Json(ctx.reviews.list(&user.id, &filter).await?))
}

async fn review_stats(
    State(ctx): State<AppContext>,
    user: SessionUser,
) -> AppResult<Json<ReviewStats>> {
    Ok(Json(ctx.reviews.stats(&user.id).await?))
}

async fn create_review(
    State(ctx): State<AppContext>,
    user: SessionUser,
    ApiJson(input): ApiJson<NewReview>,
) -> AppResult<(StatusCode, Json<Review>)> {
    users::ensure_user(&ctx.db, &user.id, user.name.as_deref(), user.email.as_deref()).await?;
    let review = ctx.reviews.create_manual(&user.id, input).await?;

    tracing::info!(user = %user.id, review = %review.id, "Manual review added");
    Ok((StatusCode::CREATED, Json(review)))
}

async fn reply_to_review(
    State(ctx): State<AppContext>,
    user: SessionUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ReplyBody>,
) -> AppResult<Json<Review>> {
    Ok(Json(ctx.reviews.set_admin_reply(&user.id, &id, &body.reply).await?))
}

/// Draft a reply and store it as the AI suggestion
async fn draft_reply(
    State(ctx): State<AppContext>,
    user: SessionUser,
    Path(id): Path<String>,
) -> AppResult<Json<Review>> {
    let review = ctx.reviews.get(&user.id, &id).await?;

    let business_name = users::get_user(&ctx.db, &user.id)
        .await?
        .and_then(|u| u.name)
        .or_else(|| user.name.clone());

    let draft = ctx.drafter.draft(&review, business_name.as_deref()).await;
    Ok(Json(ctx.reviews.set_ai_reply(&user.id, &id, &draft).await?))
}

async fn delete_review(
    State(ctx): State<AppContext>,
    user: SessionUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    ctx.reviews.delete(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
