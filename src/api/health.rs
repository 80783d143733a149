/// Health check and metrics endpoints
///
/// - `/health`: database probe, 503 when the pool cannot answer
/// - `/health/live`: process liveness
/// - `/health/detailed`: per-component status for monitoring
/// - `/metrics`: Prometheus text format
use crate::{context::AppContext, error::AppResult, metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,

    /// Application version
    pub version: String,

    /// Uptime in seconds
    pub uptime_seconds: f64,

    /// Individual component checks
    pub checks: Vec<ComponentHealth>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,

    /// Status: "healthy", "degraded", or "unhealthy"
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/live", get(liveness_probe))
        .route("/health/detailed", get(health_detailed))
        .route("/metrics", get(metrics_text))
}

/// Basic health check with a database probe
pub async fn health_basic(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Err(e) = check_database(&ctx).await {
        tracing::warn!(error = %e, "health_check_failed: database check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// Liveness probe: if we can respond, we're alive
pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Detailed health check with all component statuses
pub async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let start = Instant::now();
    let checks = vec![
        check_database_detailed(&ctx).await,
        check_integrations(&ctx),
    ];

    let overall_status = determine_overall_status(&checks);

    let health = HealthStatus {
        status: overall_status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: metrics::UPTIME_SECONDS.get(),
        checks,
        message: if overall_status == "healthy" {
            None
        } else {
            Some("One or more components are unhealthy".to_string())
        },
    };

    let status_code = match overall_status.as_str() {
        "healthy" | "degraded" => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    tracing::info!(
        status = %overall_status,
        duration_ms = start.elapsed().as_millis(),
        "health_check_completed"
    );

    (status_code, Json(health))
}

/// Prometheus scrape endpoint
pub async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

/// Check database connectivity
async fn check_database(ctx: &AppContext) -> AppResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}

/// Check database with detailed metrics
async fn check_database_detailed(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();

    match check_database(ctx).await {
        Ok(_) => ComponentHealth {
            name: "database".to_string(),
            status: "healthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
            details: Some(serde_json::json!({
                "type": "sqlite",
                "pool_size": ctx.db.size(),
            })),
        },
        Err(e) => ComponentHealth {
            name: "database".to_string(),
            status: "unhealthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: Some(e.to_string()),
            details: None,
        },
    }
}

/// Which review sources can run. Missing vendors only narrow the chain.
fn check_integrations(ctx: &AppContext) -> ComponentHealth {
    let config = &ctx.config;
    let google = config.google.is_configured();
    let booking = config.booking.api_key.is_some();
    let scraper = config.scraper.api_token.is_some();

    ComponentHealth {
        name: "review_sources".to_string(),
        status: if google || booking || scraper {
            "healthy"
        } else {
            "degraded"
        }
        .to_string(),
        response_time_ms: None,
        error: None,
        details: Some(serde_json::json!({
            "official_api": google,
            "paid_api": booking,
            "scraper": scraper,
            "synthetic_fallback": config.sync.synthetic_fallback,
            "ai_replies": config.ai.api_key.is_some(),
        })),
    }
}

/// Determine overall health status from individual checks
fn determine_overall_status(checks: &[ComponentHealth]) -> String {
    let unhealthy_count = checks.iter().filter(|c| c.status == "unhealthy").count();
    let degraded_count = checks.iter().filter(|c| c.status == "degraded").count();

    if unhealthy_count > 0 {
        "unhealthy".to_string()
    } else if degraded_count > 0 {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{client, spawn_app};

    fn component(status: &str) -> ComponentHealth {
        ComponentHealth {
            name: "c".to_string(),
            status: status.to_string(),
            response_time_ms: Some(1),
            error: None,
            details: None,
        }
    }

    #[test]
    fn test_determine_overall_status() {
        assert_eq!(determine_overall_status(&[component("healthy")]), "healthy");
        assert_eq!(
            determine_overall_status(&[component("healthy"), component("degraded")]),
            "degraded"
        );
        assert_eq!(
            determine_overall_status(&[component("degraded"), component("unhealthy")]),
            "unhealthy"
        );
    }

    #[tokio::test]
    async fn test_health_probes_database() {
        let (url, ctx) = spawn_app("http://127.0.0.1:1").await;

        let response = client().get(format!("{}/health", url)).send().await.unwrap();
        assert_eq!(response.status(), 200);

        let detailed: HealthStatus = client()
            .get(format!("{}/health/detailed", url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(detailed.status, "healthy");

        ctx.db.close().await;
        let response = client().get(format!("{}/health", url)).send().await.unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (url, _ctx) = spawn_app("http://127.0.0.1:1").await;
        metrics::record_sync_stage("scraper", "empty");

        let body = client()
            .get(format!("{}/metrics", url))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("sync_stage_outcomes_total"));
    }
}
