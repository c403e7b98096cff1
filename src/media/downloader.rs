use futures::StreamExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::naming::{content_type_for, extension_for, object_key};
use super::object_store::{ObjectStore, StorageError};
use super::staging::StagedFile;
use crate::retry::{RetryPolicy, Retryable};
use crate::storage::{DatabaseError, Episode, Store, PENDING_BATCH_LIMIT};
use uuid::Uuid;

/// Budget for one media request, body included.
pub const MEDIA_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Pause between two episodes.
pub const EPISODE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Episode has no enclosure URL")]
    MissingEnclosure,
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Download timed out")]
    Timeout,
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Staging failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl Retryable for DownloadError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadError::HttpStatus(_)
                | DownloadError::Timeout
                | DownloadError::Network(_)
                | DownloadError::Io(_)
        )
    }
}

/// Tally of one download run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub failed: usize,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Downloads complete: {} succeeded, {} failed",
            self.downloaded, self.failed
        )
    }
}

/// Moves pending episode media from its enclosure URL into object storage.
///
/// Each episode is streamed to `<staging_dir>/<episode-id>.<ext>`, uploaded
/// under `<episode-id>.<ext>`, and its row updated. The staged file is
/// removed whatever happens.
pub struct MediaDownloader {
    client: reqwest::Client,
    policy: RetryPolicy,
    timeout: Duration,
    staging_dir: PathBuf,
    episode_delay: Duration,
}

impl MediaDownloader {
    pub fn new(client: reqwest::Client, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            timeout: MEDIA_TIMEOUT,
            staging_dir: staging_dir.into(),
            episode_delay: EPISODE_DELAY,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_episode_delay(mut self, delay: Duration) -> Self {
        self.episode_delay = delay;
        self
    }

    /// Drains every `not_downloaded` episode, one at a time.
    ///
    /// Pending episodes are listed in batches, each leaving out the episodes
    /// already handled in this run, until a listing comes back empty. An
    /// episode whose row could not be updated is not retried within the same
    /// run.
    ///
    /// # Errors
    ///
    /// Only a failure to list pending episodes. Per-episode failures are
    /// logged and counted.
    pub async fn download_pending<S, O>(
        &self,
        store: &S,
        objects: &O,
    ) -> Result<DownloadSummary, DatabaseError>
    where
        S: Store + ?Sized,
        O: ObjectStore + ?Sized,
    {
        let mut summary = DownloadSummary::default();
        let mut handled: Vec<Uuid> = Vec::new();

        loop {
            let batch = store
                .list_pending_episodes(PENDING_BATCH_LIMIT, &handled)
                .await?;

            if batch.is_empty() {
                break;
            }
            tracing::info!(count = batch.len(), "Processing pending episodes");

            for episode in &batch {
                if !handled.is_empty() {
                    tokio::time::sleep(self.episode_delay).await;
                }
                handled.push(episode.id);

                match self.process_episode(store, objects, episode).await {
                    Ok(storage_path) => {
                        summary.downloaded += 1;
                        tracing::info!(
                            episode_id = %episode.id,
                            storage_path = %storage_path,
                            "Episode downloaded"
                        );
                    }
                    Err(e) => {
                        summary.failed += 1;
                        tracing::warn!(episode_id = %episode.id, error = %e, "Episode download failed");
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Downloads, uploads and records one episode. Returns the storage path.
    ///
    /// On any failure the episode is marked `failed` before the error is
    /// returned.
    pub async fn process_episode<S, O>(
        &self,
        store: &S,
        objects: &O,
        episode: &Episode,
    ) -> Result<String, DownloadError>
    where
        S: Store + ?Sized,
        O: ObjectStore + ?Sized,
    {
        match self.transfer(objects, episode).await {
            Ok(storage_path) => {
                store
                    .mark_episode_downloaded(episode.id, &storage_path)
                    .await?;
                Ok(storage_path)
            }
            Err(e) => {
                if let Err(db_err) = store.mark_episode_failed(episode.id).await {
                    tracing::warn!(
                        episode_id = %episode.id,
                        error = %db_err,
                        "Failed to mark episode failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn transfer<O: ObjectStore + ?Sized>(
        &self,
        objects: &O,
        episode: &Episode,
    ) -> Result<String, DownloadError> {
        let url = episode
            .enclosure_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(DownloadError::MissingEnclosure)?;

        let extension = extension_for(url, episode.enclosure_type.as_deref());
        let key = object_key(episode.id, extension);

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let staged = StagedFile::new(self.staging_dir.join(&key));
        let path = staged.path();

        self.policy
            .run(url, |attempt| async move {
                tracing::debug!(url = %url, attempt = attempt, "Downloading media");
                self.download_to(url, path).await
            })
            .await?;

        let content_type = content_type_for(extension);
        let key = key.as_str();
        self.policy
            .run(key, |attempt| async move {
                tracing::debug!(key = %key, attempt = attempt, "Uploading media");
                objects.put_file(key, path, content_type).await
            })
            .await?;

        Ok(format!("{}/{}", objects.bucket(), key))
    }

    async fn download_to(&self, url: &str, path: &Path) -> Result<(), DownloadError> {
        tokio::time::timeout(self.timeout, self.stream_to_file(url, path))
            .await
            .map_err(|_| DownloadError::Timeout)?
    }

    async fn stream_to_file(&self, url: &str, path: &Path) -> Result<(), DownloadError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus(response.status().as_u16()));
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MemoryObjectStore;
    use crate::storage::{DownloadState, MemoryStore, NewEpisode, NewPodcast, PodcastMetadata};
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_with_episode(
        enclosure_url: Option<String>,
        mime: Option<&str>,
    ) -> (MemoryStore, Episode) {
        let store = MemoryStore::new();
        let tenant = store.ensure_default_tenant().await.unwrap();
        let podcast = store
            .insert_podcast(&NewPodcast {
                id: Uuid::new_v4(),
                tenant_id: tenant,
                feed_url: "https://example.com/feed.xml".into(),
                metadata: PodcastMetadata::default(),
            })
            .await
            .unwrap();
        let episode = store
            .insert_episode(&NewEpisode {
                id: Uuid::new_v4(),
                podcast_id: podcast.id,
                guid: "ep-1".into(),
                enclosure_url,
                enclosure_type: mime.map(str::to_string),
                ..Default::default()
            })
            .await
            .unwrap();
        (store, episode)
    }

    /// A store holding `count` pending episodes without enclosures.
    async fn store_with_enclosureless(count: usize) -> MemoryStore {
        let (store, first) = store_with_episode(None, None).await;
        for i in 1..count {
            store
                .insert_episode(&NewEpisode {
                    id: Uuid::new_v4(),
                    podcast_id: first.podcast_id,
                    guid: format!("ep-{}", i + 1),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        store
    }

    async fn bucket() -> MemoryObjectStore {
        let objects = MemoryObjectStore::new("podcasts");
        objects.create_bucket().await.unwrap();
        objects
    }

    fn downloader(staging: &Path) -> MediaDownloader {
        MediaDownloader::new(reqwest::Client::new(), staging)
            .with_policy(RetryPolicy::new(3, Duration::from_millis(5)))
            .with_episode_delay(Duration::ZERO)
    }

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(DownloadError::HttpStatus(502).is_retryable());
        assert!(DownloadError::Timeout.is_retryable());
        assert!(!DownloadError::MissingEnclosure.is_retryable());
        assert!(!DownloadError::Upload(StorageError::Status { code: 500 }).is_retryable());
    }

    #[test]
    fn test_summary_display() {
        let summary = DownloadSummary {
            downloaded: 3,
            failed: 1,
        };
        assert_eq!(
            summary.to_string(),
            "Downloads complete: 3 succeeded, 1 failed"
        );
    }

    #[tokio::test]
    async fn test_flac_enclosure_without_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/42"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fLaC-data".to_vec()))
            .mount(&server)
            .await;

        let (store, episode) =
            store_with_episode(Some(format!("{}/media/42", server.uri())), Some("audio/flac")).await;
        let objects = bucket().await;
        let staging = tempfile::tempdir().unwrap();

        let storage_path = downloader(staging.path())
            .process_episode(&store, &objects, &episode)
            .await
            .unwrap();

        let key = format!("{}.flac", episode.id);
        assert_eq!(storage_path, format!("podcasts/{}", key));

        let object = objects.object(&key).unwrap();
        assert_eq!(object.body, b"fLaC-data");
        assert_eq!(object.content_type, "audio/flac");

        let stored = store.get_episode(episode.id).await.unwrap().unwrap();
        assert_eq!(stored.download_state, DownloadState::Downloaded);
        assert_eq!(stored.storage_path.as_deref(), Some(storage_path.as_str()));
        assert!(stored.downloaded_at.is_some());
        assert_eq!(staged_files(staging.path()), 0);
    }

    #[tokio::test]
    async fn test_three_failed_attempts_mark_failed_and_clean_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let (store, episode) =
            store_with_episode(Some(format!("{}/ep.mp3", server.uri())), None).await;
        let objects = bucket().await;
        let staging = tempfile::tempdir().unwrap();

        let err = downloader(staging.path())
            .process_episode(&store, &objects, &episode)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus(500)));

        let stored = store.get_episode(episode.id).await.unwrap().unwrap();
        assert_eq!(stored.download_state, DownloadState::Failed);
        assert_eq!(stored.storage_path, None);
        assert!(objects.keys().is_empty());
        assert_eq!(staged_files(staging.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_enclosure_marks_failed() {
        let (store, episode) = store_with_episode(None, None).await;
        let objects = bucket().await;
        let staging = tempfile::tempdir().unwrap();

        let err = downloader(staging.path())
            .process_episode(&store, &objects, &episode)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::MissingEnclosure));

        let stored = store.get_episode(episode.id).await.unwrap().unwrap();
        assert_eq!(stored.download_state, DownloadState::Failed);
    }

    #[tokio::test]
    async fn test_upload_failure_marks_failed_and_removes_staged_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let (store, episode) =
            store_with_episode(Some(format!("{}/ep.mp3", server.uri())), None).await;
        let objects = bucket().await;
        objects.set_fail_uploads(true);
        let staging = tempfile::tempdir().unwrap();

        let err = downloader(staging.path())
            .process_episode(&store, &objects, &episode)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Upload(_)));

        let stored = store.get_episode(episode.id).await.unwrap().unwrap();
        assert_eq!(stored.download_state, DownloadState::Failed);
        assert_eq!(staged_files(staging.path()), 0);
    }

    #[tokio::test]
    async fn test_transient_upload_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let (store, episode) =
            store_with_episode(Some(format!("{}/ep.mp3", server.uri())), None).await;
        let objects = bucket().await;
        objects.fail_next_uploads(2);
        let staging = tempfile::tempdir().unwrap();

        let storage_path = downloader(staging.path())
            .process_episode(&store, &objects, &episode)
            .await
            .unwrap();

        assert_eq!(storage_path, format!("podcasts/{}.mp3", episode.id));
        let stored = store.get_episode(episode.id).await.unwrap().unwrap();
        assert_eq!(stored.download_state, DownloadState::Downloaded);
        assert_eq!(staged_files(staging.path()), 0);
    }

    #[tokio::test]
    async fn test_slow_download_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"ID3".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let (store, episode) =
            store_with_episode(Some(format!("{}/ep.mp3", server.uri())), None).await;
        let objects = bucket().await;
        let staging = tempfile::tempdir().unwrap();

        let err = downloader(staging.path())
            .with_policy(RetryPolicy::new(1, Duration::ZERO))
            .with_timeout(Duration::from_millis(50))
            .process_episode(&store, &objects, &episode)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Timeout));
    }

    #[tokio::test]
    async fn test_download_pending_drains_and_tallies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3".to_vec()))
            .mount(&server)
            .await;

        let (store, first) =
            store_with_episode(Some(format!("{}/good.mp3", server.uri())), None).await;
        let second = store
            .insert_episode(&NewEpisode {
                id: Uuid::new_v4(),
                podcast_id: first.podcast_id,
                guid: "ep-2".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let objects = bucket().await;
        let staging = tempfile::tempdir().unwrap();

        let summary = downloader(staging.path())
            .download_pending(&store, &objects)
            .await
            .unwrap();

        assert_eq!(
            summary,
            DownloadSummary {
                downloaded: 1,
                failed: 1
            }
        );
        assert!(store.list_pending_episodes(10, &[]).await.unwrap().is_empty());
        let second = store.get_episode(second.id).await.unwrap().unwrap();
        assert_eq!(second.download_state, DownloadState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_past_one_batch_with_default_delay() {
        const COUNT: usize = PENDING_BATCH_LIMIT as usize + 5;
        let store = store_with_enclosureless(COUNT).await;
        let objects = bucket().await;
        let staging = tempfile::tempdir().unwrap();

        let start = tokio::time::Instant::now();
        let summary = MediaDownloader::new(reqwest::Client::new(), staging.path())
            .download_pending(&store, &objects)
            .await
            .unwrap();

        assert_eq!(
            summary,
            DownloadSummary {
                downloaded: 0,
                failed: COUNT
            }
        );
        assert!(start.elapsed() >= EPISODE_DELAY * (COUNT as u32 - 1));
        assert!(store.list_pending_episodes(10, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrecorded_failures_do_not_hide_later_episodes() {
        const COUNT: usize = PENDING_BATCH_LIMIT as usize + 5;
        let store = store_with_enclosureless(COUNT).await;
        store.set_fail_updates(true);
        let objects = bucket().await;
        let staging = tempfile::tempdir().unwrap();

        let summary = downloader(staging.path())
            .download_pending(&store, &objects)
            .await
            .unwrap();

        assert_eq!(summary.failed, COUNT);
        let pending = store
            .list_pending_episodes(PENDING_BATCH_LIMIT * 2, &[])
            .await
            .unwrap();
        assert_eq!(pending.len(), COUNT);
    }
}
