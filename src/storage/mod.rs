//! Relational storage for podcasts and episodes.
//!
//! The pipeline talks to storage through the [`Store`] trait. [`Database`] is
//! the PostgreSQL implementation; [`MemoryStore`] keeps everything in process.

mod episodes;
mod memory;
mod podcasts;
mod schema;
mod types;

use async_trait::async_trait;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use schema::Database;
pub use types::{
    DatabaseError, DownloadState, Episode, NewEpisode, NewPodcast, Podcast, PodcastMetadata,
    DEFAULT_TENANT_ID, DEFAULT_TENANT_NAME,
};

/// Maximum number of pending episodes returned by one listing.
pub const PENDING_BATCH_LIMIT: i64 = 1000;

/// CRUD surface the ingestion and download pipelines need.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the default tenant if absent and return its identifier.
    async fn ensure_default_tenant(&self) -> Result<Uuid, DatabaseError>;

    async fn get_podcast(&self, id: Uuid) -> Result<Option<Podcast>, DatabaseError>;
    async fn find_podcast_by_feed_url(
        &self,
        feed_url: &str,
    ) -> Result<Option<Podcast>, DatabaseError>;
    async fn insert_podcast(&self, podcast: &NewPodcast) -> Result<Podcast, DatabaseError>;
    async fn update_podcast(
        &self,
        id: Uuid,
        metadata: &PodcastMetadata,
    ) -> Result<Podcast, DatabaseError>;

    async fn get_episode(&self, id: Uuid) -> Result<Option<Episode>, DatabaseError>;
    async fn find_episode_by_guid(&self, guid: &str) -> Result<Option<Episode>, DatabaseError>;
    async fn insert_episode(&self, episode: &NewEpisode) -> Result<Episode, DatabaseError>;
    /// Up to `limit` episodes in the `not_downloaded` state, leaving out the
    /// ids in `exclude`.
    async fn list_pending_episodes(
        &self,
        limit: i64,
        exclude: &[Uuid],
    ) -> Result<Vec<Episode>, DatabaseError>;
    async fn mark_episode_downloaded(
        &self,
        id: Uuid,
        storage_path: &str,
    ) -> Result<(), DatabaseError>;
    async fn mark_episode_failed(&self, id: Uuid) -> Result<(), DatabaseError>;
}

#[async_trait]
impl Store for Database {
    async fn ensure_default_tenant(&self) -> Result<Uuid, DatabaseError> {
        Database::ensure_default_tenant(self).await
    }

    async fn get_podcast(&self, id: Uuid) -> Result<Option<Podcast>, DatabaseError> {
        Database::get_podcast(self, id).await
    }

    async fn find_podcast_by_feed_url(
        &self,
        feed_url: &str,
    ) -> Result<Option<Podcast>, DatabaseError> {
        Database::find_podcast_by_feed_url(self, feed_url).await
    }

    async fn insert_podcast(&self, podcast: &NewPodcast) -> Result<Podcast, DatabaseError> {
        Database::insert_podcast(self, podcast).await
    }

    async fn update_podcast(
        &self,
        id: Uuid,
        metadata: &PodcastMetadata,
    ) -> Result<Podcast, DatabaseError> {
        Database::update_podcast(self, id, metadata).await
    }

    async fn get_episode(&self, id: Uuid) -> Result<Option<Episode>, DatabaseError> {
        Database::get_episode(self, id).await
    }

    async fn find_episode_by_guid(&self, guid: &str) -> Result<Option<Episode>, DatabaseError> {
        Database::find_episode_by_guid(self, guid).await
    }

    async fn insert_episode(&self, episode: &NewEpisode) -> Result<Episode, DatabaseError> {
        Database::insert_episode(self, episode).await
    }

    async fn list_pending_episodes(
        &self,
        limit: i64,
        exclude: &[Uuid],
    ) -> Result<Vec<Episode>, DatabaseError> {
        Database::list_pending_episodes(self, limit, exclude).await
    }

    async fn mark_episode_downloaded(
        &self,
        id: Uuid,
        storage_path: &str,
    ) -> Result<(), DatabaseError> {
        Database::mark_episode_downloaded(self, id, storage_path).await
    }

    async fn mark_episode_failed(&self, id: Uuid) -> Result<(), DatabaseError> {
        Database::mark_episode_failed(self, id).await
    }
}
