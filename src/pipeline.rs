//! The two run modes, ingest and download, wired from their parts.
//!
//! [`ingest`] and [`download`] take their collaborators as trait objects so
//! they run the same against PostgreSQL/S3 and the in-memory stores.
//! [`run_ingest`] and [`run_downloads`] build the real collaborators from a
//! [`Config`] first.

use anyhow::{Context, Result};
use std::fmt;

use crate::config::{Config, SourcesConfig};
use crate::feed::{collect_urls, fetch_feed, upsert_feed};
use crate::media::{ensure_bucket, MediaDownloader, ObjectStore, S3Store};
use crate::retry::RetryPolicy;
use crate::storage::{Database, Store};

pub use crate::media::DownloadSummary;

/// Tally of one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub feeds_total: usize,
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    pub episodes_inserted: usize,
    pub episodes_skipped: usize,
    pub episodes_failed: usize,
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ingest complete: {}/{} feeds ok ({} failed); episodes: {} new, {} known, {} failed",
            self.feeds_ok,
            self.feeds_total,
            self.feeds_failed,
            self.episodes_inserted,
            self.episodes_skipped,
            self.episodes_failed
        )
    }
}

/// Collects feed URLs and fetches and upserts each one in turn.
///
/// A feed that fails to fetch or store is logged and counted; the run goes on.
///
/// # Errors
///
/// Tenant provisioning failure, or no feed URLs in any source.
pub async fn ingest<S: Store + ?Sized>(
    store: &S,
    client: &reqwest::Client,
    sources: &SourcesConfig,
    policy: &RetryPolicy,
) -> Result<IngestSummary> {
    let tenant_id = store
        .ensure_default_tenant()
        .await
        .context("Failed to provision default tenant")?;

    let urls = collect_urls(sources)
        .await
        .context("Failed to collect feed URLs")?;

    let mut summary = IngestSummary {
        feeds_total: urls.len(),
        ..Default::default()
    };

    for url in &urls {
        let feed = match fetch_feed(client, url, policy).await {
            Ok(feed) => feed,
            Err(e) => {
                summary.feeds_failed += 1;
                tracing::warn!(url = %url, error = %e, "Feed fetch failed");
                continue;
            }
        };

        match upsert_feed(store, tenant_id, url, &feed).await {
            Ok(outcome) => {
                summary.feeds_ok += 1;
                summary.episodes_inserted += outcome.inserted;
                summary.episodes_skipped += outcome.skipped;
                summary.episodes_failed += outcome.failed;
                tracing::info!(
                    url = %url,
                    title = feed.title.as_deref().unwrap_or(""),
                    new_episodes = outcome.inserted,
                    "Feed ingested"
                );
            }
            Err(e) => {
                summary.feeds_failed += 1;
                tracing::warn!(url = %url, error = %e, "Feed upsert failed");
            }
        }
    }

    Ok(summary)
}

/// Bootstraps the bucket and drains every pending episode into it.
///
/// # Errors
///
/// Tenant provisioning, bucket bootstrap, or listing pending episodes.
pub async fn download<S, O>(
    store: &S,
    objects: &O,
    downloader: &MediaDownloader,
) -> Result<DownloadSummary>
where
    S: Store + ?Sized,
    O: ObjectStore + ?Sized,
{
    store
        .ensure_default_tenant()
        .await
        .context("Failed to provision default tenant")?;

    ensure_bucket(objects)
        .await
        .with_context(|| format!("Failed to prepare bucket '{}'", objects.bucket()))?;

    let summary = downloader
        .download_pending(store, objects)
        .await
        .context("Failed to list pending episodes")?;

    tracing::info!(
        downloaded = summary.downloaded,
        failed = summary.failed,
        "Download run finished"
    );
    Ok(summary)
}

pub async fn run_ingest(config: &Config) -> Result<IngestSummary> {
    let db = Database::open(&config.database)
        .await
        .context("Failed to open database")?;
    let client = crate::feed::build_client().context("Failed to build HTTP client")?;

    ingest(&db, &client, &config.sources, &RetryPolicy::default()).await
}

pub async fn run_downloads(config: &Config) -> Result<DownloadSummary> {
    let db = Database::open(&config.database)
        .await
        .context("Failed to open database")?;
    let objects = S3Store::new(&config.storage).context("Failed to configure object storage")?;
    let client = reqwest::Client::builder()
        .user_agent(crate::feed::fetcher::USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;
    let downloader = MediaDownloader::new(client, config.storage.staging_dir.clone());

    download(&db, &objects, &downloader).await
}
