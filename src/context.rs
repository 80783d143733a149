/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    credentials::CredentialStore,
    db,
    error::{AppError, AppResult},
    oauth::{OAuthClient, TokenRefresher},
    reviews::{ReplyDrafter, ReviewStore},
    sources::{BookingSource, GoogleBusinessSource, ReviewSource, ScraperSource, SyntheticSource},
    sync::SyncOrchestrator,
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub credentials: CredentialStore,
    pub reviews: ReviewStore,
    pub drafter: Arc<ReplyDrafter>,
    pub oauth: Arc<OAuthClient>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

fn client_error(what: &str) -> impl FnOnce(reqwest::Error) -> AppError + '_ {
    move |e| AppError::Internal(format!("Failed to build {} client: {}", what, e))
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        // Validate configuration
        config.validate()?;

        let db = db::create_pool(
            &config.storage.database_path,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await?;

        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        Self::with_pool(config, db)
    }

    /// Wire every service on top of an existing pool
    pub fn with_pool(config: ServerConfig, db: SqlitePool) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.sync.http_timeout_secs);

        let oauth = Arc::new(
            OAuthClient::new(config.google.clone(), timeout).map_err(client_error("OAuth"))?,
        );
        if !oauth.is_configured() {
            tracing::warn!("Google OAuth is not configured; the official API stage is disabled");
        }

        // Stage order matters: first source with results wins
        let sources: Vec<Arc<dyn ReviewSource>> = vec![
            Arc::new(
                GoogleBusinessSource::new(config.google.clone(), timeout)
                    .map_err(client_error("Google"))?,
            ),
            Arc::new(
                BookingSource::new(config.booking.clone(), timeout)
                    .map_err(client_error("Booking"))?,
            ),
            Arc::new(
                ScraperSource::new(config.scraper.clone(), timeout)
                    .map_err(client_error("scraper"))?,
            ),
            Arc::new(SyntheticSource::new(config.sync.synthetic_fallback)),
        ];

        let refresher: Arc<dyn TokenRefresher> = oauth.clone();
        let orchestrator = Arc::new(SyncOrchestrator::new(
            db.clone(),
            refresher,
            sources,
            chrono::Duration::seconds(config.sync.refresh_margin_secs),
        ));

        let drafter = Arc::new(
            ReplyDrafter::new(config.ai.clone(), timeout).map_err(client_error("AI"))?,
        );

        Ok(Self {
            config: Arc::new(config),
            credentials: CredentialStore::new(db.clone()),
            reviews: ReviewStore::new(db.clone()),
            drafter,
            oauth,
            orchestrator,
            db,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
