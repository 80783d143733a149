/// API routes and handlers
pub mod accounts;
pub mod health;
pub mod reviews;
pub mod sync;
pub mod widget;

use crate::{context::AppContext, error::AppError};
use axum::{
    extract::{FromRequest, Request},
    Json, Router,
};
use serde::de::DeserializeOwned;

/// JSON body extractor whose rejections use the `{ "error": ... }` shape
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(sync::routes())
        .merge(reviews::routes())
        .merge(accounts::routes())
        .merge(widget::routes())
}
