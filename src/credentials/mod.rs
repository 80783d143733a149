/// Credential store: per-user, per-platform OAuth tokens and account labels
///
/// One row per `(user_id, platform)`. Upserts merge into the existing row and
/// never clear a stored token the caller did not supply, because providers
/// usually omit `refresh_token` on every consent after the first.

use crate::{db::models::ConnectedAccount, error::AppResult};
use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

/// Stored credentials are the connected account row
pub type Credential = ConnectedAccount;

/// Fields to merge into a connected account. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Epoch millis
    pub expires_at: Option<i64>,
    pub connected_label: Option<String>,
    pub provider_account_id: Option<String>,
    pub locator: Option<String>,
}

/// Insert-or-merge keyed on `(user_id, platform)` against any executor,
/// so callers can run it inside a transaction.
pub async fn upsert_with<'e, E>(
    executor: E,
    user_id: &str,
    platform: &str,
    update: &CredentialUpdate,
) -> AppResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO connected_accounts
            (id, user_id, platform, access_token, refresh_token, expires_at,
             connected_label, provider_account_id, locator, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        ON CONFLICT(user_id, platform) DO UPDATE SET
            access_token = COALESCE(excluded.access_token, connected_accounts.access_token),
            refresh_token = COALESCE(excluded.refresh_token, connected_accounts.refresh_token),
            expires_at = COALESCE(excluded.expires_at, connected_accounts.expires_at),
            connected_label = COALESCE(excluded.connected_label, connected_accounts.connected_label),
            provider_account_id = COALESCE(excluded.provider_account_id, connected_accounts.provider_account_id),
            locator = COALESCE(excluded.locator, connected_accounts.locator),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(platform)
    .bind(&update.access_token)
    .bind(&update.refresh_token)
    .bind(update.expires_at)
    .bind(&update.connected_label)
    .bind(&update.provider_account_id)
    .bind(&update.locator)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

/// Credential store service
#[derive(Clone)]
pub struct CredentialStore {
    db: SqlitePool,
}

impl CredentialStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Get the credential for a user and platform
    pub async fn get(&self, user_id: &str, platform: &str) -> AppResult<Option<Credential>> {
        let account = sqlx::query_as::<_, ConnectedAccount>(
            r#"
            SELECT id, user_id, platform, access_token, refresh_token, expires_at,
                   connected_label, provider_account_id, locator, created_at, updated_at
            FROM connected_accounts
            WHERE user_id = ?1 AND platform = ?2
            "#,
        )
        .bind(user_id)
        .bind(platform)
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    /// Insert or merge credential fields
    pub async fn upsert(
        &self,
        user_id: &str,
        platform: &str,
        update: &CredentialUpdate,
    ) -> AppResult<()> {
        upsert_with(&self.db, user_id, platform, update).await
    }

    /// All connected accounts for a user
    pub async fn list(&self, user_id: &str) -> AppResult<Vec<ConnectedAccount>> {
        let accounts = sqlx::query_as::<_, ConnectedAccount>(
            r#"
            SELECT id, user_id, platform, access_token, refresh_token, expires_at,
                   connected_label, provider_account_id, locator, created_at, updated_at
            FROM connected_accounts
            WHERE user_id = ?1
            ORDER BY platform
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(accounts)
    }

    /// Disconnect a platform. Returns false when nothing was connected.
    pub async fn delete(&self, user_id: &str, platform: &str) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM connected_accounts WHERE user_id = ?1 AND platform = ?2")
                .bind(user_id)
                .bind(platform)
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
