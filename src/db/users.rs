/// User rows: created lazily the first time a session touches the database
use crate::{db::models::User, error::AppResult};
use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};

/// Insert the user if absent. Returns true when a row was created.
pub async fn ensure_user<'e, E>(
    executor: E,
    id: &str,
    name: Option<&str>,
    email: Option<&str>,
) -> AppResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO users (id, name, email, created_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(email)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fetch a user by id
pub async fn get_user(db: &SqlitePool, id: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password_hash, account_type, settings, created_at
        FROM users
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    Ok(user)
}
