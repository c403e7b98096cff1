//! In-process [`Store`] used by tests and dry runs.
//!
//! Enforces the same unique keys as the PostgreSQL schema (feed URL, GUID)
//! and keeps rows in insertion order, which is the order `list_pending`
//! returns them in.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::types::{
    DatabaseError, DownloadState, Episode, NewEpisode, NewPodcast, Podcast, PodcastMetadata,
    DEFAULT_TENANT_ID,
};
use super::Store;

#[derive(Default)]
struct Tables {
    tenants: Vec<Uuid>,
    podcasts: Vec<Podcast>,
    episodes: Vec<Episode>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_updates: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A poisoned lock only means a test panicked mid-write; the data is still usable
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every download-state update fail, leaving rows pending.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    fn check_updates(&self) -> Result<(), DatabaseError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DatabaseError::Connection("connection reset".into()));
        }
        Ok(())
    }

    pub fn tenants(&self) -> Vec<Uuid> {
        self.lock().tenants.clone()
    }

    pub fn podcasts(&self) -> Vec<Podcast> {
        self.lock().podcasts.clone()
    }

    pub fn episodes(&self) -> Vec<Episode> {
        self.lock().episodes.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ensure_default_tenant(&self) -> Result<Uuid, DatabaseError> {
        let mut tables = self.lock();
        if !tables.tenants.contains(&DEFAULT_TENANT_ID) {
            tables.tenants.push(DEFAULT_TENANT_ID);
        }
        Ok(DEFAULT_TENANT_ID)
    }

    async fn get_podcast(&self, id: Uuid) -> Result<Option<Podcast>, DatabaseError> {
        Ok(self.lock().podcasts.iter().find(|p| p.id == id).cloned())
    }

    async fn find_podcast_by_feed_url(
        &self,
        feed_url: &str,
    ) -> Result<Option<Podcast>, DatabaseError> {
        Ok(self
            .lock()
            .podcasts
            .iter()
            .find(|p| p.feed_url == feed_url)
            .cloned())
    }

    async fn insert_podcast(&self, podcast: &NewPodcast) -> Result<Podcast, DatabaseError> {
        let mut tables = self.lock();
        if tables.podcasts.iter().any(|p| p.feed_url == podcast.feed_url) {
            return Err(DatabaseError::Conflict(format!(
                "podcast feed_url {}",
                podcast.feed_url
            )));
        }
        if !tables.tenants.contains(&podcast.tenant_id) {
            return Err(DatabaseError::NotFound {
                entity: "tenant",
                id: podcast.tenant_id,
            });
        }

        let now = Utc::now();
        let row = Podcast {
            id: podcast.id,
            tenant_id: podcast.tenant_id,
            feed_url: podcast.feed_url.clone(),
            metadata: podcast.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.podcasts.push(row.clone());
        Ok(row)
    }

    async fn update_podcast(
        &self,
        id: Uuid,
        metadata: &PodcastMetadata,
    ) -> Result<Podcast, DatabaseError> {
        let mut tables = self.lock();
        let row = tables
            .podcasts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(DatabaseError::NotFound {
                entity: "podcast",
                id,
            })?;
        row.metadata = metadata.clone();
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn get_episode(&self, id: Uuid) -> Result<Option<Episode>, DatabaseError> {
        Ok(self.lock().episodes.iter().find(|e| e.id == id).cloned())
    }

    async fn find_episode_by_guid(&self, guid: &str) -> Result<Option<Episode>, DatabaseError> {
        Ok(self.lock().episodes.iter().find(|e| e.guid == guid).cloned())
    }

    async fn insert_episode(&self, episode: &NewEpisode) -> Result<Episode, DatabaseError> {
        let mut tables = self.lock();
        if tables.episodes.iter().any(|e| e.guid == episode.guid) {
            return Err(DatabaseError::Conflict(format!("episode guid {}", episode.guid)));
        }
        if !tables.podcasts.iter().any(|p| p.id == episode.podcast_id) {
            return Err(DatabaseError::NotFound {
                entity: "podcast",
                id: episode.podcast_id,
            });
        }

        let row = Episode::from_new(episode.clone(), Utc::now());
        tables.episodes.push(row.clone());
        Ok(row)
    }

    async fn list_pending_episodes(
        &self,
        limit: i64,
        exclude: &[Uuid],
    ) -> Result<Vec<Episode>, DatabaseError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .lock()
            .episodes
            .iter()
            .filter(|e| e.download_state == DownloadState::NotDownloaded)
            .filter(|e| !exclude.contains(&e.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_episode_downloaded(
        &self,
        id: Uuid,
        storage_path: &str,
    ) -> Result<(), DatabaseError> {
        self.check_updates()?;
        let mut tables = self.lock();
        let row = tables
            .episodes
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(DatabaseError::NotFound {
                entity: "episode",
                id,
            })?;
        let now = Utc::now();
        row.download_state = DownloadState::Downloaded;
        row.downloaded_at = Some(now);
        row.storage_path = Some(storage_path.to_string());
        row.updated_at = now;
        Ok(())
    }

    async fn mark_episode_failed(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.check_updates()?;
        let mut tables = self.lock();
        let row = tables
            .episodes
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(DatabaseError::NotFound {
                entity: "episode",
                id,
            })?;
        row.download_state = DownloadState::Failed;
        row.updated_at = Utc::now();
        Ok(())
    }
}
