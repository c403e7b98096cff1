use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, DownloadState, Episode, EpisodeDbRow, NewEpisode};

impl Database {
    // ========================================================================
    // Episode Operations
    // ========================================================================

    pub async fn get_episode(&self, id: Uuid) -> Result<Option<Episode>, DatabaseError> {
        sqlx::query_as::<_, EpisodeDbRow>("SELECT * FROM episodes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(EpisodeDbRow::into_episode)
            .transpose()
    }

    pub async fn find_episode_by_guid(&self, guid: &str) -> Result<Option<Episode>, DatabaseError> {
        sqlx::query_as::<_, EpisodeDbRow>("SELECT * FROM episodes WHERE guid = $1")
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?
            .map(EpisodeDbRow::into_episode)
            .transpose()
    }

    pub async fn insert_episode(&self, episode: &NewEpisode) -> Result<Episode, DatabaseError> {
        let row = sqlx::query_as::<_, EpisodeDbRow>(
            r#"
            INSERT INTO episodes (
                id, podcast_id, guid, title, description, link,
                enclosure_url, enclosure_type, enclosure_length, published_at,
                duration, episode_number, episode_type, image_url, explicit,
                download_state
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
        "#,
        )
        .bind(episode.id)
        .bind(episode.podcast_id)
        .bind(&episode.guid)
        .bind(&episode.title)
        .bind(&episode.description)
        .bind(&episode.link)
        .bind(&episode.enclosure_url)
        .bind(&episode.enclosure_type)
        .bind(episode.enclosure_length)
        .bind(episode.published_at)
        .bind(&episode.duration)
        .bind(episode.episode_number)
        .bind(&episode.episode_type)
        .bind(&episode.image_url)
        .bind(episode.explicit)
        .bind(DownloadState::NotDownloaded.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.into_episode()
    }

    /// Episodes still waiting for their media, oldest first, capped at `limit`.
    /// Ids in `exclude` are skipped.
    pub async fn list_pending_episodes(
        &self,
        limit: i64,
        exclude: &[Uuid],
    ) -> Result<Vec<Episode>, DatabaseError> {
        sqlx::query_as::<_, EpisodeDbRow>(
            r#"
            SELECT * FROM episodes
            WHERE download_state = $1
              AND NOT (id = ANY($2))
            ORDER BY created_at, id
            LIMIT $3
        "#,
        )
        .bind(DownloadState::NotDownloaded.as_str())
        .bind(exclude)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(EpisodeDbRow::into_episode)
        .collect()
    }

    pub async fn mark_episode_downloaded(
        &self,
        id: Uuid,
        storage_path: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE episodes SET
                download_state = $2,
                downloaded_at = now(),
                storage_path = $3,
                updated_at = now()
            WHERE id = $1
        "#,
        )
        .bind(id)
        .bind(DownloadState::Downloaded.as_str())
        .bind(storage_path)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                entity: "episode",
                id,
            });
        }
        Ok(())
    }

    pub async fn mark_episode_failed(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result =
            sqlx::query("UPDATE episodes SET download_state = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(DownloadState::Failed.as_str())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                entity: "episode",
                id,
            });
        }
        Ok(())
    }
}
