use uuid::Uuid;

use super::schema::Database;
use super::types::{
    DatabaseError, NewPodcast, Podcast, PodcastMetadata, DEFAULT_TENANT_ID, DEFAULT_TENANT_NAME,
};

impl Database {
    // ========================================================================
    // Tenant Operations
    // ========================================================================

    /// Create the default tenant if it does not exist yet.
    pub async fn ensure_default_tenant(&self) -> Result<Uuid, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO tenants (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(DEFAULT_TENANT_ID)
        .bind(DEFAULT_TENANT_NAME)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(tenant_id = %DEFAULT_TENANT_ID, "Provisioned default tenant");
        }
        Ok(DEFAULT_TENANT_ID)
    }

    // ========================================================================
    // Podcast Operations
    // ========================================================================

    pub async fn get_podcast(&self, id: Uuid) -> Result<Option<Podcast>, DatabaseError> {
        let podcast = sqlx::query_as::<_, Podcast>("SELECT * FROM podcasts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(podcast)
    }

    pub async fn find_podcast_by_feed_url(
        &self,
        feed_url: &str,
    ) -> Result<Option<Podcast>, DatabaseError> {
        let podcast = sqlx::query_as::<_, Podcast>("SELECT * FROM podcasts WHERE feed_url = $1")
            .bind(feed_url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(podcast)
    }

    pub async fn insert_podcast(&self, podcast: &NewPodcast) -> Result<Podcast, DatabaseError> {
        let m = &podcast.metadata;
        let row = sqlx::query_as::<_, Podcast>(
            r#"
            INSERT INTO podcasts (
                id, tenant_id, feed_url, title, description, link, language,
                copyright, author, owner_email, image_url, category, explicit
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
        "#,
        )
        .bind(podcast.id)
        .bind(podcast.tenant_id)
        .bind(&podcast.feed_url)
        .bind(&m.title)
        .bind(&m.description)
        .bind(&m.link)
        .bind(&m.language)
        .bind(&m.copyright)
        .bind(&m.author)
        .bind(&m.owner_email)
        .bind(&m.image_url)
        .bind(&m.category)
        .bind(m.explicit)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Overwrite the mutable metadata of a podcast. Identity, feed URL and
    /// tenant are left alone.
    pub async fn update_podcast(
        &self,
        id: Uuid,
        metadata: &PodcastMetadata,
    ) -> Result<Podcast, DatabaseError> {
        let row = sqlx::query_as::<_, Podcast>(
            r#"
            UPDATE podcasts SET
                title = $2,
                description = $3,
                link = $4,
                language = $5,
                copyright = $6,
                author = $7,
                owner_email = $8,
                image_url = $9,
                category = $10,
                explicit = $11,
                updated_at = now()
            WHERE id = $1
            RETURNING *
        "#,
        )
        .bind(id)
        .bind(&metadata.title)
        .bind(&metadata.description)
        .bind(&metadata.link)
        .bind(&metadata.language)
        .bind(&metadata.copyright)
        .bind(&metadata.author)
        .bind(&metadata.owner_email)
        .bind(&metadata.image_url)
        .bind(&metadata.category)
        .bind(metadata.explicit)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(DatabaseError::NotFound {
            entity: "podcast",
            id,
        })
    }
}
