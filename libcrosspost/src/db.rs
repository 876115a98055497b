//! SQLite storage for linked accounts and the retry queue

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::accounts::AccountStore;
use crate::error::{DbError, Result};
use crate::retry_queue::{RetryQueueEntry, RetryQueueStore};
use crate::types::{Platform, PlatformAccount};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn parse_platform(table: &'static str, value: &str) -> Result<Platform> {
    value.parse().map_err(|reason| {
        DbError::CorruptRow {
            table,
            reason,
        }
        .into()
    })
}

fn account_from_row(row: &SqliteRow) -> Result<PlatformAccount> {
    let platform: String = row.get("platform");

    Ok(PlatformAccount {
        account_id: row.get("account_id"),
        user_id: row.get("user_id"),
        platform: parse_platform("platform_accounts", &platform)?,
        external_account_id: row.get("external_account_id"),
        username: row.get("username"),
        access_token: SecretString::from(row.get::<String, _>("access_token")),
        refresh_token: row
            .get::<Option<String>, _>("refresh_token")
            .map(SecretString::from),
        token_expiry: row.get("token_expiry"),
        active: row.get("active"),
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<RetryQueueEntry> {
    let platform: String = row.get("platform");

    Ok(RetryQueueEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        platform: parse_platform("retry_queue", &platform)?,
        serialized_content: row.get("serialized_content"),
        serialized_options: row.get("serialized_options"),
        content_hash: row.get("content_hash"),
        attempt_count: row.get::<i64, _>("attempt_count").max(0) as u32,
        last_error: row.get("last_error"),
        next_retry_at: row.get("next_retry_at"),
        created_at: row.get("created_at"),
    })
}

impl Database {
    /// Open (creating if needed) the database and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// All accounts linked by a user
    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<PlatformAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, user_id, platform, external_account_id, username,
                   access_token, refresh_token, token_expiry, active
            FROM platform_accounts WHERE user_id = ?
            ORDER BY platform
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(account_from_row).collect()
    }
}

#[async_trait]
impl AccountStore for Database {
    async fn get_account(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformAccount>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, user_id, platform, external_account_id, username,
                   access_token, refresh_token, token_expiry, active
            FROM platform_accounts WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn save_account(&self, account: &PlatformAccount) -> Result<()> {
        let refresh_token = account
            .refresh_token
            .as_ref()
            .map(|t| t.expose_secret().to_string());

        sqlx::query(
            r#"
            INSERT INTO platform_accounts (
                account_id, user_id, platform, external_account_id, username,
                access_token, refresh_token, token_expiry, active, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, platform) DO UPDATE SET
                external_account_id = excluded.external_account_id,
                username = excluded.username,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expiry = excluded.token_expiry,
                active = excluded.active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&account.account_id)
        .bind(&account.user_id)
        .bind(account.platform.as_str())
        .bind(&account.external_account_id)
        .bind(&account.username)
        .bind(account.access_token.expose_secret())
        .bind(refresh_token)
        .bind(account.token_expiry)
        .bind(account.active)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

#[async_trait]
impl RetryQueueStore for Database {
    async fn enqueue(&self, entry: RetryQueueEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO retry_queue (
                id, user_id, platform, serialized_content, serialized_options,
                content_hash, attempt_count, last_error, next_retry_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(entry.platform.as_str())
        .bind(&entry.serialized_content)
        .bind(&entry.serialized_options)
        .bind(&entry.content_hash)
        .bind(entry.attempt_count as i64)
        .bind(&entry.last_error)
        .bind(entry.next_retry_at)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn due(&self, now: i64, limit: usize) -> Result<Vec<RetryQueueEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, platform, serialized_content, serialized_options,
                   content_hash, attempt_count, last_error, next_retry_at, created_at
            FROM retry_queue
            WHERE next_retry_at <= ?
            ORDER BY next_retry_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM retry_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn len(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM retry_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.get::<i64, _>("count") as usize)
    }
}
