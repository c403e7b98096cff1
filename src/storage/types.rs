use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Well-known identifier of the tenant every podcast is provisioned under.
pub const DEFAULT_TENANT_ID: Uuid = Uuid::from_u128(1);

/// Display name of the default tenant.
pub const DEFAULT_TENANT_NAME: &str = "default";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The server could not be reached or refused the credentials
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    /// Schema bootstrap failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A row looked up by primary key does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// A unique key (feed URL, GUID) is already taken
    #[error("Duplicate {0}")]
    Conflict(String),

    /// A stored value could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DatabaseError::Conflict(db_err.message().to_string());
            }
        }
        DatabaseError::Other(err)
    }
}

// ============================================================================
// Download State
// ============================================================================

/// Where an episode is in the media mirroring lifecycle.
///
/// Moves from `NotDownloaded` to either `Downloaded` or `Failed`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DownloadState {
    #[default]
    NotDownloaded,
    Downloaded,
    Failed,
}

impl DownloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadState::NotDownloaded => "not_downloaded",
            DownloadState::Downloaded => "downloaded",
            DownloadState::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadState {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_downloaded" => Ok(DownloadState::NotDownloaded),
            "downloaded" => Ok(DownloadState::Downloaded),
            "failed" => Ok(DownloadState::Failed),
            other => Err(DatabaseError::Corrupt(format!(
                "unknown download state {:?}",
                other
            ))),
        }
    }
}

// ============================================================================
// Podcasts
// ============================================================================

/// The part of a podcast row that is refreshed on every successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct PodcastMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    pub author: Option<String>,
    pub owner_email: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub explicit: Option<bool>,
}

/// A podcast about to be inserted.
#[derive(Debug, Clone)]
pub struct NewPodcast {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub feed_url: String,
    pub metadata: PodcastMetadata,
}

/// A stored podcast. `feed_url` is unique; `id`, `feed_url` and `tenant_id`
/// never change after insertion.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Podcast {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub feed_url: String,
    #[sqlx(flatten)]
    pub metadata: PodcastMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Episodes
// ============================================================================

/// An episode about to be inserted. Always starts out `NotDownloaded`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEpisode {
    pub id: Uuid,
    pub podcast_id: Uuid,
    /// Dedup key: the item GUID, its link, or `<podcast-id>-<title>`.
    pub guid: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub enclosure_url: Option<String>,
    pub enclosure_type: Option<String>,
    pub enclosure_length: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    pub episode_number: Option<i32>,
    pub episode_type: Option<String>,
    pub image_url: Option<String>,
    pub explicit: Option<bool>,
}

/// A stored episode.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub id: Uuid,
    pub podcast_id: Uuid,
    pub guid: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub enclosure_url: Option<String>,
    pub enclosure_type: Option<String>,
    pub enclosure_length: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    pub episode_number: Option<i32>,
    pub episode_type: Option<String>,
    pub image_url: Option<String>,
    pub explicit: Option<bool>,
    pub download_state: DownloadState,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub storage_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Episode {
    /// Materializes a freshly inserted episode.
    pub(crate) fn from_new(new: NewEpisode, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            podcast_id: new.podcast_id,
            guid: new.guid,
            title: new.title,
            description: new.description,
            link: new.link,
            enclosure_url: new.enclosure_url,
            enclosure_type: new.enclosure_type,
            enclosure_length: new.enclosure_length,
            published_at: new.published_at,
            duration: new.duration,
            episode_number: new.episode_number,
            episode_type: new.episode_type,
            image_url: new.image_url,
            explicit: new.explicit,
            download_state: DownloadState::NotDownloaded,
            downloaded_at: None,
            storage_path: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Internal row type for episode queries (used by sqlx FromRow).
/// Converts to Episode via into_episode(), decoding the state column.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EpisodeDbRow {
    pub id: Uuid,
    pub podcast_id: Uuid,
    pub guid: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub enclosure_url: Option<String>,
    pub enclosure_type: Option<String>,
    pub enclosure_length: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    pub episode_number: Option<i32>,
    pub episode_type: Option<String>,
    pub image_url: Option<String>,
    pub explicit: Option<bool>,
    pub download_state: String,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub storage_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EpisodeDbRow {
    pub(crate) fn into_episode(self) -> Result<Episode, DatabaseError> {
        Ok(Episode {
            id: self.id,
            podcast_id: self.podcast_id,
            guid: self.guid,
            title: self.title,
            description: self.description,
            link: self.link,
            enclosure_url: self.enclosure_url,
            enclosure_type: self.enclosure_type,
            enclosure_length: self.enclosure_length,
            published_at: self.published_at,
            duration: self.duration,
            episode_number: self.episode_number,
            episode_type: self.episode_type,
            image_url: self.image_url,
            explicit: self.explicit,
            download_state: self.download_state.parse()?,
            downloaded_at: self.downloaded_at,
            storage_path: self.storage_path,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
