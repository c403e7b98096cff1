use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::time::Duration;

use super::types::DatabaseError;
use crate::config::DatabaseConfig;
use secrecy::ExposeSecret;

/// Advisory lock key held while the schema is bootstrapped.
const SCHEMA_LOCK_KEY: i64 = 0x706f_6463_6174_6368;

// ============================================================================
// Database
// ============================================================================

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: PgPool,
}

impl Database {
    /// Connect with the configured credentials and bootstrap the schema.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(config.password.expose_secret())
            .database(&config.name);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        tracing::info!(host = %config.host, port = config.port, database = %config.name, "Connected to database");
        Self::from_pool(pool).await
    }

    /// Connect with a `postgres://` URL and bootstrap the schema.
    pub async fn open_url(url: &str) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: PgPool) -> Result<Self, DatabaseError> {
        let db = Self { pool };
        db.migrate()
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(db)
    }

    /// Create tables and indexes atomically within a transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op. There is no versioning; the layout is fixed.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Concurrent CREATE TABLE IF NOT EXISTS can still collide in pg_type
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS podcasts (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL REFERENCES tenants(id),
                feed_url TEXT NOT NULL UNIQUE,
                title TEXT,
                description TEXT,
                link TEXT,
                language TEXT,
                copyright TEXT,
                author TEXT,
                owner_email TEXT,
                image_url TEXT,
                category TEXT,
                explicit BOOLEAN,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // GUID uniqueness is global, not per podcast
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                id UUID PRIMARY KEY,
                podcast_id UUID NOT NULL REFERENCES podcasts(id) ON DELETE CASCADE,
                guid TEXT NOT NULL UNIQUE,
                title TEXT,
                description TEXT,
                link TEXT,
                enclosure_url TEXT,
                enclosure_type TEXT,
                enclosure_length BIGINT,
                published_at TIMESTAMPTZ,
                duration TEXT,
                episode_number INTEGER,
                episode_type TEXT,
                image_url TEXT,
                explicit BOOLEAN,
                download_state TEXT NOT NULL DEFAULT 'not_downloaded'
                    CHECK (download_state IN ('not_downloaded', 'downloaded', 'failed')),
                downloaded_at TIMESTAMPTZ,
                storage_path TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_episodes_podcast ON episodes(podcast_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_episodes_download_state ON episodes(download_state)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
