//! SQLite-backed [`ProfileStore`].

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, trace};

use super::{LearnerProfile, ProfileError, ProfileStore};
use crate::whatsapp::mask_phone;

/// Schema applied on startup.
const SCHEMA: &str = include_str!("../../migrations/001_learners.sql");

/// Maximum pooled connections for file-backed databases.
const MAX_CONNECTIONS: u32 = 5;

/// Row type returned by SQLite queries for learners.
type LearnerRow = (String, Option<String>, Option<String>, String, String);

/// Profile store over a `learners` table.
#[derive(Debug, Clone)]
pub struct SqliteProfileStore {
    db: SqlitePool,
}

impl SqliteProfileStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    ///
    /// Accepts any `sqlite:` URL. In-memory databases (`sqlite::memory:` or
    /// `?mode=memory`) are limited to one connection so every query sees the
    /// same database.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Database`] if the URL is invalid, the file
    /// cannot be opened, or the schema fails to apply.
    pub async fn connect(url: &str) -> Result<Self, ProfileError> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = if is_in_memory(url) {
            // An in-memory database lives and dies with its one connection.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };
        let db = pool.connect_with(opts).await?;
        let store = Self::from_pool(db);
        store.migrate().await?;
        info!(url, "learner profile store ready");
        Ok(store)
    }

    /// Wrap an existing pool. Call [`Self::migrate`] before first use.
    pub fn from_pool(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Apply the `learners` schema. Safe to run repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Database`] if the DDL fails.
    pub async fn migrate(&self) -> Result<(), ProfileError> {
        sqlx::raw_sql(SCHEMA).execute(&self.db).await?;
        Ok(())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    async fn fetch(&self, phone: &str) -> Result<Option<LearnerProfile>, ProfileError> {
        let row: Option<LearnerRow> = sqlx::query_as(
            "SELECT phone, name, last_topic, history, created_at \
             FROM learners WHERE phone = ?1",
        )
        .bind(phone)
        .fetch_optional(&self.db)
        .await?;
        row.map(decode_row).transpose()
    }
}

/// Whether `url` names an in-memory database.
fn is_in_memory(url: &str) -> bool {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    path.ends_with(":memory:")
        || query
            .split('&')
            .any(|pair| pair.eq_ignore_ascii_case("mode=memory"))
}

fn decode_row(row: LearnerRow) -> Result<LearnerProfile, ProfileError> {
    let (phone, name, last_topic, history, created_at) = row;
    let history: Vec<String> =
        serde_json::from_str(&history).map_err(|e| ProfileError::Corrupt {
            phone: phone.clone(),
            field: "history",
            reason: e.to_string(),
        })?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ProfileError::Corrupt {
            phone: phone.clone(),
            field: "created_at",
            reason: e.to_string(),
        })?;
    Ok(LearnerProfile {
        phone,
        name,
        last_topic,
        history,
        created_at,
    })
}

fn encode_history(profile: &LearnerProfile) -> Result<String, ProfileError> {
    serde_json::to_string(&profile.history).map_err(|e| ProfileError::Corrupt {
        phone: profile.phone.clone(),
        field: "history",
        reason: e.to_string(),
    })
}

/// Insert a new row, leaving any existing row untouched.
///
/// Returns whether a row was inserted.
async fn insert_if_absent(db: &SqlitePool, profile: &LearnerProfile) -> Result<bool, ProfileError> {
    let result = sqlx::query(
        "INSERT INTO learners (phone, name, last_topic, history, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(phone) DO NOTHING",
    )
    .bind(&profile.phone)
    .bind(&profile.name)
    .bind(&profile.last_topic)
    .bind(encode_history(profile)?)
    .bind(profile.created_at.to_rfc3339())
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<LearnerProfile>, ProfileError> {
        self.fetch(phone).await
    }

    async fn create(
        &self,
        phone: &str,
        name: Option<&str>,
    ) -> Result<LearnerProfile, ProfileError> {
        let profile = LearnerProfile::new(phone, name.map(str::to_owned));
        if !insert_if_absent(&self.db, &profile).await? {
            return Err(ProfileError::AlreadyExists(phone.to_owned()));
        }
        trace!(phone = %mask_phone(phone), "learner profile created");
        Ok(profile)
    }

    async fn save(&self, profile: &LearnerProfile) -> Result<(), ProfileError> {
        let result = sqlx::query(
            "UPDATE learners SET name = ?1, last_topic = ?2, history = ?3 WHERE phone = ?4",
        )
        .bind(&profile.name)
        .bind(&profile.last_topic)
        .bind(encode_history(profile)?)
        .bind(&profile.phone)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ProfileError::NotFound(profile.phone.clone()));
        }
        trace!(
            phone = %mask_phone(&profile.phone),
            entries = profile.history.len(),
            "learner profile saved"
        );
        Ok(())
    }

    async fn find_or_create(
        &self,
        phone: &str,
        name: Option<&str>,
    ) -> Result<LearnerProfile, ProfileError> {
        let fresh = LearnerProfile::new(phone, name.map(str::to_owned));
        if insert_if_absent(&self.db, &fresh).await? {
            debug!(phone = %mask_phone(phone), "first message from new learner");
            return Ok(fresh);
        }
        self.fetch(phone)
            .await?
            .ok_or_else(|| ProfileError::NotFound(phone.to_owned()))
    }
}
