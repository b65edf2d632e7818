//! Learner profiles and the store that owns them.
//!
//! A [`LearnerProfile`] is keyed by bare phone number (no channel prefix).
//! The orchestrator only ever holds a per-request working copy; the
//! [`ProfileStore`] is the source of truth.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::sqlite::SqliteProfileStore;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Persisted learning progress for one phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerProfile {
    /// Bare phone number, e.g. `+15551234567`.
    pub phone: String,
    /// Display name reported by the channel, if any.
    pub name: Option<String>,
    /// Most recently assigned topic.
    pub last_topic: Option<String>,
    /// Topics already presented, oldest first.
    pub history: Vec<String>,
    /// When the profile was first created. Never changes.
    pub created_at: DateTime<Utc>,
}

impl LearnerProfile {
    /// A fresh profile with empty history.
    pub fn new(phone: impl Into<String>, name: Option<String>) -> Self {
        Self {
            phone: phone.into(),
            name,
            last_topic: None,
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Make `topic` the active topic.
    ///
    /// When `record` is true the topic is also appended to the history. A topic
    /// already present in the history is never appended twice.
    pub fn assign_topic(&mut self, topic: &str, record: bool) {
        self.last_topic = Some(topic.to_owned());
        if record && !self.history.iter().any(|t| t == topic) {
            self.history.push(topic.to_owned());
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from profile store operations.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A profile for this phone number already exists.
    #[error("profile already exists: {0}")]
    AlreadyExists(String),

    /// No profile exists for this phone number.
    #[error("profile not found: {0}")]
    NotFound(String),

    /// A stored row could not be decoded.
    #[error("corrupt {field} for {phone}: {reason}")]
    Corrupt {
        /// Phone number of the bad row.
        phone: String,
        /// Column that failed to decode.
        field: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// The store is not reachable (used by non-SQL backends).
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Durable mapping from phone number to [`LearnerProfile`].
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Look up a profile by bare phone number.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when the store cannot be read.
    async fn find_by_phone(&self, phone: &str) -> Result<Option<LearnerProfile>, ProfileError>;

    /// Create a profile with empty history.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::AlreadyExists`] if the phone number is taken.
    async fn create(&self, phone: &str, name: Option<&str>)
        -> Result<LearnerProfile, ProfileError>;

    /// Overwrite the mutable fields of an existing profile.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NotFound`] if the profile was never created.
    async fn save(&self, profile: &LearnerProfile) -> Result<(), ProfileError>;

    /// Load the profile for `phone`, creating it if absent.
    ///
    /// The default is read-then-create and tolerates losing a creation race.
    /// Backends with an atomic upsert should override it.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when the store cannot be read or written.
    async fn find_or_create(
        &self,
        phone: &str,
        name: Option<&str>,
    ) -> Result<LearnerProfile, ProfileError> {
        if let Some(profile) = self.find_by_phone(phone).await? {
            return Ok(profile);
        }
        match self.create(phone, name).await {
            Ok(profile) => Ok(profile),
            Err(ProfileError::AlreadyExists(_)) => self
                .find_by_phone(phone)
                .await?
                .ok_or_else(|| ProfileError::NotFound(phone.to_owned())),
            Err(e) => Err(e),
        }
    }
}
