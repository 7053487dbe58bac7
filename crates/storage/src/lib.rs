use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use uuid::Uuid;

use shared::domain::{ProfileRecord, ProfileUpdate, UserId};

const PROFILE_COLUMNS: &str =
    "id, provider, provider_id, email, display_name, avatar_url, created_at, updated_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProfile {
    pub user_id: UserId,
    pub provider: String,
    pub provider_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row written the first time a user is seen, derived from token claims.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub user_id: UserId,
    pub provider: String,
    pub provider_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<StoredProfile> for ProfileRecord {
    fn from(value: StoredProfile) -> Self {
        Self {
            id: Some(value.user_id),
            provider: Some(value.provider),
            provider_id: Some(value.provider_id),
            email: value.email,
            display_name: value.display_name,
            name: None,
            avatar_url: value.avatar_url,
            updated_at: Some(value.updated_at),
        }
    }
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every in-memory connection is its own database, so pin the pool to one.
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Opens an existing database read-only. Nothing is created or migrated.
    pub async fn open_existing(database_url: &str) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(false)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn load_profile(&self, user_id: UserId) -> Result<Option<StoredProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ? LIMIT 1"
        ))
        .bind(user_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("failed to load profile")?;
        row.map(|row| profile_from_row(&row)).transpose()
    }

    pub async fn upsert_profile(&self, profile: &NewProfile) -> Result<StoredProfile> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO profiles (id, provider, provider_id, email, display_name, avatar_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO UPDATE SET
                provider = excluded.provider,
                provider_id = excluded.provider_id,
                email = excluded.email,
                display_name = excluded.display_name,
                avatar_url = excluded.avatar_url,
                updated_at = excluded.updated_at
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(profile.user_id.0.to_string())
        .bind(&profile.provider)
        .bind(&profile.provider_id)
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(&profile.avatar_url)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to upsert profile {}", profile.user_id))?;
        profile_from_row(&row)
    }

    /// Applies the non-`None` fields of `update`. Returns `None` when the user has no row.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Option<StoredProfile>> {
        let row = sqlx::query(&format!(
            "UPDATE profiles SET
                display_name = COALESCE(?1, display_name),
                avatar_url = COALESCE(?2, avatar_url),
                updated_at = ?3
             WHERE id = ?4
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(&update.display_name)
        .bind(&update.avatar_url)
        .bind(Utc::now())
        .bind(user_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to update profile {user_id}"))?;
        row.map(|row| profile_from_row(&row)).transpose()
    }

    pub async fn list_profiles(&self, limit: u32, offset: u32) -> Result<Vec<StoredProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at, id LIMIT ? OFFSET ?"
        ))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .context("failed to list profiles")?;
        rows.iter().map(profile_from_row).collect()
    }
}

fn profile_from_row(row: &SqliteRow) -> Result<StoredProfile> {
    let raw_id: String = row.try_get("id")?;
    let user_id = Uuid::parse_str(&raw_id)
        .with_context(|| format!("profile row has malformed id '{raw_id}'"))?;
    Ok(StoredProfile {
        user_id: UserId(user_id),
        provider: row.try_get("provider")?,
        provider_id: row.try_get("provider_id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        avatar_url: row.try_get("avatar_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
