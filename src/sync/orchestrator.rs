/// Sync orchestrator: stage state machine plus atomic persistence

use crate::{
    auth::SessionUser,
    credentials::{self, Credential, CredentialStore, CredentialUpdate},
    db::users::ensure_user,
    error::{AppError, AppResult},
    metrics,
    oauth::{needs_refresh, TokenRefresher},
    reviews::store::insert_with,
    sources::{ReviewSource, SourceBatch},
    sync::{SyncOutcome, SyncRequest, SyncStage},
};
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, error, info, warn};

/// What a sync produced
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Reviews returned by the winning stage
    pub count: usize,
    /// Rows that were new to the store
    pub inserted: u64,
    /// Winning stage, `None` when every stage came back empty
    pub source: Option<SyncStage>,
}

/// Runs the source chain for a request and stores the first batch of results
pub struct SyncOrchestrator {
    db: SqlitePool,
    credentials: CredentialStore,
    refresher: Arc<dyn TokenRefresher>,
    sources: Vec<Arc<dyn ReviewSource>>,
    refresh_margin: Duration,
}

impl SyncOrchestrator {
    /// `sources` must be in stage order
    pub fn new(
        db: SqlitePool,
        refresher: Arc<dyn TokenRefresher>,
        sources: Vec<Arc<dyn ReviewSource>>,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            credentials: CredentialStore::new(db.clone()),
            db,
            refresher,
            sources,
            refresh_margin,
        }
    }

    /// Sync reviews for `user` from the first source that returns any
    pub async fn sync(&self, user: &SessionUser, request: &SyncRequest) -> AppResult<SyncReport> {
        info!(
            user = %user.id,
            platform = %request.platform,
            use_token = request.use_token,
            "Starting review sync"
        );

        // Loaded on first use per credential key; None means no usable credential
        let mut credentials: HashMap<&'static str, Option<Credential>> = HashMap::new();

        for source in &self.sources {
            let stage = source.stage();
            let credential_platform = source.credential_platform();

            let outcome = match credential_platform {
                _ if !source.applies_to(request) => SyncOutcome::NotAttempted,
                Some(key) => {
                    if !credentials.contains_key(key) {
                        let loaded = self.usable_credential(&user.id, key).await?;
                        credentials.insert(key, loaded);
                    }
                    match credentials.get(key).and_then(Option::as_ref) {
                        Some(c) => source.run(request, Some(c)).await,
                        None => SyncOutcome::Failed("no usable credential".to_string()),
                    }
                }
                None => source.run(request, None).await,
            };

            metrics::record_sync_stage(stage.as_str(), outcome.label());
            debug!(stage = stage.as_str(), outcome = outcome.label(), "Sync stage finished");

            if let SyncOutcome::Results(batch) = outcome {
                let account_platform = credential_platform.unwrap_or(request.platform.as_str());
                return self
                    .persist(user, request, account_platform, stage, batch)
                    .await;
            }
        }

        info!(platform = %request.platform, "No source returned reviews");
        Ok(SyncReport {
            count: 0,
            inserted: 0,
            source: None,
        })
    }

    /// Stored credential, refreshed when it is within the margin of expiry.
    /// Refresh problems yield `None` so the official stage fails on its own.
    async fn usable_credential(&self, user_id: &str, platform: &str) -> AppResult<Option<Credential>> {
        let Some(mut credential) = self.credentials.get(user_id, platform).await? else {
            debug!(%platform, "No stored credential");
            return Ok(None);
        };

        let now = Utc::now();
        if !needs_refresh(credential.expires_at, now, self.refresh_margin) {
            return Ok(Some(credential));
        }

        let Some(refresh_token) = credential.refresh_token.clone().filter(|t| !t.is_empty()) else {
            warn!(%platform, "Access token is stale and no refresh token is stored");
            metrics::record_token_refresh(false);
            return Ok(None);
        };

        let grant = match self.refresher.refresh(&refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(%platform, "Token refresh failed: {}", e);
                metrics::record_token_refresh(false);
                return Ok(None);
            }
        };
        metrics::record_token_refresh(true);

        let update = CredentialUpdate {
            access_token: Some(grant.access_token.clone()),
            refresh_token: grant.refresh_token.clone(),
            expires_at: grant.expires_at(now),
            ..Default::default()
        };
        self.credentials.upsert(user_id, platform, &update).await?;

        credential.access_token = Some(grant.access_token);
        if update.expires_at.is_some() {
            credential.expires_at = update.expires_at;
        }
        if update.refresh_token.is_some() {
            credential.refresh_token = update.refresh_token;
        }

        Ok(Some(credential))
    }

    async fn persist(
        &self,
        user: &SessionUser,
        request: &SyncRequest,
        account_platform: &str,
        stage: SyncStage,
        batch: SourceBatch,
    ) -> AppResult<SyncReport> {
        let inserted = self
            .write_batch(user, request, account_platform, stage, &batch)
            .await
            .map_err(|e| {
                error!(platform = %request.platform, stage = stage.as_str(), "Sync rolled back: {}", e);
                AppError::Sync(e.to_string())
            })?;

        metrics::record_reviews_imported(&request.platform, stage.origin().as_str(), inserted);
        info!(
            platform = %request.platform,
            stage = stage.as_str(),
            count = batch.reviews.len(),
            inserted,
            "Review sync complete"
        );

        Ok(SyncReport {
            count: batch.reviews.len(),
            inserted,
            source: Some(stage),
        })
    }

    /// User, connected account and reviews in one transaction.
    /// Dropping `tx` on an early return rolls back and releases the connection.
    /// The account row is keyed by `account_platform`, reviews by the request platform.
    async fn write_batch(
        &self,
        user: &SessionUser,
        request: &SyncRequest,
        account_platform: &str,
        stage: SyncStage,
        batch: &SourceBatch,
    ) -> AppResult<u64> {
        let mut tx = self.db.begin().await?;

        ensure_user(&mut *tx, &user.id, user.name.as_deref(), user.email.as_deref()).await?;

        let label = batch
            .label
            .clone()
            .or_else(|| request.locator.clone())
            .unwrap_or_else(|| request.platform.clone());
        let account = CredentialUpdate {
            connected_label: Some(label),
            provider_account_id: batch.provider_account_id.clone(),
            locator: request.locator.clone(),
            ..Default::default()
        };
        credentials::upsert_with(&mut *tx, &user.id, account_platform, &account).await?;

        let mut inserted = 0;
        for review in &batch.reviews {
            if insert_with(&mut *tx, &user.id, &request.platform, stage.origin(), review).await? {
                inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::test_pool,
        oauth::{TokenGrant, TokenRefreshError},
        reviews::{RawReview, Sentiment},
        config::testing::config_with_base_url,
        sources::{GoogleBusinessSource, SourceError, SyntheticSource},
        testing::spawn_stub,
    };
    use async_trait::async_trait;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    struct FakeSource {
        stage: SyncStage,
        credential_platform: Option<&'static str>,
        result: Result<Vec<RawReview>, String>,
        calls: AtomicUsize,
        seen_token: Mutex<Option<String>>,
    }

    impl FakeSource {
        fn new(stage: SyncStage, result: Result<Vec<RawReview>, String>) -> Self {
            Self {
                stage,
                credential_platform: (stage == SyncStage::OfficialApi).then_some("google"),
                result,
                calls: AtomicUsize::new(0),
                seen_token: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ReviewSource for FakeSource {
        fn stage(&self) -> SyncStage {
            self.stage
        }

        fn applies_to(&self, request: &SyncRequest) -> bool {
            self.stage != SyncStage::OfficialApi || request.use_token
        }

        fn credential_platform(&self) -> Option<&'static str> {
            self.credential_platform
        }

        async fn fetch(
            &self,
            _request: &SyncRequest,
            credential: Option<&Credential>,
        ) -> Result<SourceBatch, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_token.lock().unwrap() = credential.and_then(|c| c.access_token.clone());

            match &self.result {
                Ok(reviews) => Ok(SourceBatch {
                    reviews: reviews.clone(),
                    label: Some(format!("{} label", self.stage.as_str())),
                    provider_account_id: None,
                }),
                Err(reason) => Err(SourceError::Payload(reason.clone())),
            }
        }
    }

    struct FakeRefresher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeRefresher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, TokenRefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TokenRefreshError::Status {
                    status: 400,
                    body: "invalid_grant".to_string(),
                });
            }
            Ok(TokenGrant {
                access_token: "fresh-token".to_string(),
                expires_in: Some(3600),
                refresh_token: None,
                scope: None,
            })
        }
    }

    fn user() -> SessionUser {
        SessionUser {
            id: "user-1".to_string(),
            name: Some("Pat".to_string()),
            email: Some("pat@example.com".to_string()),
        }
    }

    fn review(author: &str, content: &str, rating: f64) -> RawReview {
        RawReview::new(Some(rating), content.to_string(), author.to_string(), None, Utc::now())
    }

    fn orchestrator(
        db: &SqlitePool,
        refresher: Arc<FakeRefresher>,
        sources: Vec<Arc<dyn ReviewSource>>,
    ) -> SyncOrchestrator {
        SyncOrchestrator::new(db.clone(), refresher, sources, Duration::minutes(5))
    }

    async fn count(db: &SqlitePool, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(db).await.unwrap()
    }

    async fn store_google_token(db: &SqlitePool, expires_in: Duration, refresh: Option<&str>) {
        ensure_user(db, "user-1", None, None).await.unwrap();
        CredentialStore::new(db.clone())
            .upsert(
                "user-1",
                "google",
                &CredentialUpdate {
                    access_token: Some("old-token".to_string()),
                    refresh_token: refresh.map(str::to_string),
                    expires_at: Some((Utc::now() + expires_in).timestamp_millis()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_twice_inserts_once() {
        let db = test_pool().await;
        let paid = Arc::new(FakeSource::new(
            SyncStage::PaidApi,
            Ok(vec![review("Ana", "Lovely", 5.0), review("Ben", "Okay", 3.0)]),
        ));
        let orchestrator = orchestrator(&db, FakeRefresher::new(false), vec![paid]);
        let request = SyncRequest::new("booking", Some("5936336"), false);

        let first = orchestrator.sync(&user(), &request).await.unwrap();
        let second = orchestrator.sync(&user(), &request).await.unwrap();

        assert_eq!((first.count, first.inserted), (2, 2));
        assert_eq!((second.count, second.inserted), (2, 0));
        assert_eq!(second.source, Some(SyncStage::PaidApi));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM reviews").await, 2);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM connected_accounts").await, 1);
    }

    #[tokio::test]
    async fn test_official_failure_falls_through_to_paid() {
        let db = test_pool().await;
        store_google_token(&db, Duration::hours(1), Some("refresh")).await;

        let official = Arc::new(FakeSource::new(SyncStage::OfficialApi, Err("quota".to_string())));
        let paid = Arc::new(FakeSource::new(
            SyncStage::PaidApi,
            Ok(vec![review("Cy", "Great", 4.0)]),
        ));
        let orchestrator = orchestrator(
            &db,
            FakeRefresher::new(false),
            vec![official.clone(), paid.clone()],
        );

        let report = orchestrator
            .sync(&user(), &SyncRequest::new("google", None, true))
            .await
            .unwrap();

        assert_eq!(official.calls.load(Ordering::SeqCst), 1);
        assert_eq!(paid.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.source, Some(SyncStage::PaidApi));

        let source: String = sqlx::query_scalar("SELECT source FROM reviews")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(source, "paid_api");
    }

    #[tokio::test]
    async fn test_stops_at_first_results() {
        let db = test_pool().await;
        let paid = Arc::new(FakeSource::new(SyncStage::PaidApi, Ok(vec![review("A", "x", 5.0)])));
        let scraper = Arc::new(FakeSource::new(SyncStage::Scraper, Ok(vec![review("B", "y", 5.0)])));
        let orchestrator = orchestrator(
            &db,
            FakeRefresher::new(false),
            vec![paid, scraper.clone()],
        );

        orchestrator
            .sync(&user(), &SyncRequest::new("yelp", Some("https://yelp.com/biz/x"), false))
            .await
            .unwrap();

        assert_eq!(scraper.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_chain_ends_in_synthetic_reviews() {
        let db = test_pool().await;
        let paid = Arc::new(FakeSource::new(SyncStage::PaidApi, Ok(vec![])));
        let scraper = Arc::new(FakeSource::new(SyncStage::Scraper, Err("blocked".to_string())));
        let orchestrator = orchestrator(
            &db,
            FakeRefresher::new(false),
            vec![paid, scraper, Arc::new(SyntheticSource::new(true))],
        );

        let report = orchestrator
            .sync(&user(), &SyncRequest::new("hotel", None, false))
            .await
            .unwrap();

        assert_eq!(report.source, Some(SyncStage::SyntheticFallback));
        assert!(report.count > 0);

        let rows: Vec<(f64, String, String)> =
            sqlx::query_as("SELECT rating, content, source FROM reviews")
                .fetch_all(&db)
                .await
                .unwrap();
        assert_eq!(rows.len(), report.count);
        for (rating, content, source) in rows {
            assert!((1.0..=5.0).contains(&rating));
            assert!(!content.is_empty());
            assert_eq!(source, "synthetic");
        }
    }

    #[tokio::test]
    async fn test_disabled_fallback_reports_zero() {
        let db = test_pool().await;
        let orchestrator = orchestrator(
            &db,
            FakeRefresher::new(false),
            vec![Arc::new(SyntheticSource::new(false))],
        );

        let report = orchestrator
            .sync(&user(), &SyncRequest::new("hotel", None, false))
            .await
            .unwrap();

        assert_eq!(report.count, 0);
        assert_eq!(report.source, None);
    }

    #[tokio::test]
    async fn test_refreshes_token_inside_margin() {
        let db = test_pool().await;
        store_google_token(&db, Duration::minutes(2), Some("refresh")).await;

        let refresher = FakeRefresher::new(false);
        let official = Arc::new(FakeSource::new(
            SyncStage::OfficialApi,
            Ok(vec![review("Dee", "Nice", 5.0)]),
        ));
        let orchestrator = orchestrator(&db, refresher.clone(), vec![official.clone()]);

        orchestrator
            .sync(&user(), &SyncRequest::new("google", None, true))
            .await
            .unwrap();

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(official.seen_token.lock().unwrap().as_deref(), Some("fresh-token"));

        let stored = CredentialStore::new(db.clone())
            .get("user-1", "google")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("fresh-token"));
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));
        assert!(stored.expires_at.unwrap() > (Utc::now() + Duration::minutes(50)).timestamp_millis());
    }

    #[tokio::test]
    async fn test_google_variant_platform_uses_google_credential() {
        let db = test_pool().await;
        store_google_token(&db, Duration::hours(1), Some("refresh")).await;

        let vendor = Router::new()
            .route(
                "/accounts-api/accounts",
                get(|| async { Json(json!({ "accounts": [{ "name": "accounts/1" }] })) }),
            )
            .route(
                "/locations-api/accounts/1/locations",
                get(|| async {
                    Json(json!({ "locations": [{ "name": "locations/9", "title": "Harbor Cafe" }] }))
                }),
            )
            .route(
                "/reviews-api/accounts/1/locations/9/reviews",
                get(|| async {
                    Json(json!({ "reviews": [{
                        "starRating": "FIVE",
                        "comment": "Best espresso in town",
                        "reviewer": { "displayName": "Jo" }
                    }] }))
                }),
            );
        let base_url = spawn_stub(vendor).await;
        let google = GoogleBusinessSource::new(
            config_with_base_url(&base_url).google,
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        let paid = Arc::new(FakeSource::new(SyncStage::PaidApi, Ok(vec![review("P", "paid", 4.0)])));
        let orchestrator = orchestrator(
            &db,
            FakeRefresher::new(false),
            vec![Arc::new(google), paid.clone()],
        );

        let report = orchestrator
            .sync(
                &user(),
                &SyncRequest::new("google_maps", Some("https://maps.google.com/?cid=1"), true),
            )
            .await
            .unwrap();

        assert_eq!(report.source, Some(SyncStage::OfficialApi));
        assert_eq!(report.count, 1);
        assert_eq!(paid.calls.load(Ordering::SeqCst), 0);

        let platforms: Vec<String> =
            sqlx::query_scalar("SELECT platform FROM connected_accounts")
                .fetch_all(&db)
                .await
                .unwrap();
        assert_eq!(platforms, vec!["google".to_string()]);

        let review_platform: String = sqlx::query_scalar("SELECT platform FROM reviews")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(review_platform, "google_maps");
    }

    #[tokio::test]
    async fn test_skips_refresh_outside_margin() {
        let db = test_pool().await;
        store_google_token(&db, Duration::minutes(10), Some("refresh")).await;

        let refresher = FakeRefresher::new(false);
        let official = Arc::new(FakeSource::new(
            SyncStage::OfficialApi,
            Ok(vec![review("Dee", "Nice", 5.0)]),
        ));
        let orchestrator = orchestrator(&db, refresher.clone(), vec![official.clone()]);

        orchestrator
            .sync(&user(), &SyncRequest::new("google", None, true))
            .await
            .unwrap();

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(official.seen_token.lock().unwrap().as_deref(), Some("old-token"));
    }

    #[tokio::test]
    async fn test_failed_refresh_skips_official_stage() {
        let db = test_pool().await;
        store_google_token(&db, Duration::minutes(-1), Some("refresh")).await;

        let official = Arc::new(FakeSource::new(
            SyncStage::OfficialApi,
            Ok(vec![review("Dee", "Nice", 5.0)]),
        ));
        let paid = Arc::new(FakeSource::new(SyncStage::PaidApi, Ok(vec![review("Eve", "Fine", 4.0)])));
        let orchestrator = orchestrator(
            &db,
            FakeRefresher::new(true),
            vec![official.clone(), paid.clone()],
        );

        let report = orchestrator
            .sync(&user(), &SyncRequest::new("google", None, true))
            .await
            .unwrap();

        assert_eq!(official.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.source, Some(SyncStage::PaidApi));
    }

    #[tokio::test]
    async fn test_stale_token_without_refresh_token_skips_official_stage() {
        let db = test_pool().await;
        store_google_token(&db, Duration::minutes(1), None).await;

        let refresher = FakeRefresher::new(false);
        let official = Arc::new(FakeSource::new(
            SyncStage::OfficialApi,
            Ok(vec![review("Dee", "Nice", 5.0)]),
        ));
        let orchestrator = orchestrator(&db, refresher.clone(), vec![official.clone()]);

        let report = orchestrator
            .sync(&user(), &SyncRequest::new("google", None, true))
            .await
            .unwrap();

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(official.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.count, 0);
    }

    #[tokio::test]
    async fn test_second_sync_updates_single_account_row() {
        let db = test_pool().await;
        let paid = Arc::new(FakeSource::new(SyncStage::PaidApi, Ok(vec![review("A", "x", 5.0)])));
        let orchestrator = orchestrator(&db, FakeRefresher::new(false), vec![paid]);

        orchestrator
            .sync(&user(), &SyncRequest::new("booking", Some("111"), false))
            .await
            .unwrap();
        orchestrator
            .sync(&user(), &SyncRequest::new("booking", Some("222"), false))
            .await
            .unwrap();

        let accounts = CredentialStore::new(db.clone()).list("user-1").await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].locator.as_deref(), Some("222"));
        assert_eq!(accounts[0].connected_label.as_deref(), Some("paid_api label"));
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_everything() {
        let db = test_pool().await;
        let invalid = RawReview {
            rating: 9.0,
            content: "breaks the rating check".to_string(),
            author: "Zed".to_string(),
            sentiment: Sentiment::Positive,
            created_at: Utc::now(),
        };
        let paid = Arc::new(FakeSource::new(
            SyncStage::PaidApi,
            Ok(vec![review("A", "valid", 5.0), invalid]),
        ));
        let orchestrator = orchestrator(&db, FakeRefresher::new(false), vec![paid]);

        let err = orchestrator
            .sync(&user(), &SyncRequest::new("booking", Some("111"), false))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Sync(_)));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM reviews").await, 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM connected_accounts").await, 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users").await, 0);

        // The pool's only connection went back after the rollback
        assert_eq!(count(&db, "SELECT 1").await, 1);
    }
}
