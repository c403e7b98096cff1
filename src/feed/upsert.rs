//! Maps parsed feeds onto podcast and episode rows.
//!
//! Podcasts are keyed by feed URL and refreshed on every fetch. Episodes are
//! keyed by GUID and written once.

use uuid::Uuid;

use crate::feed::parser::{ParsedFeed, ParsedItem};
use crate::storage::{DatabaseError, NewEpisode, NewPodcast, PodcastMetadata, Store};

/// What one upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub podcast_id: Uuid,
    /// `true` when the podcast row was created by this call.
    pub created: bool,
    pub inserted: usize,
    /// Items whose key was already stored.
    pub skipped: usize,
    pub failed: usize,
}

/// Key an item is stored under: its GUID, else its link, else
/// `"<podcast-id>-<title>"`.
///
/// The last fallback collides when one podcast carries two GUID-less,
/// link-less items with the same title; the second is then treated as
/// already stored. Returns `None` when the item has none of the three.
pub fn episode_key(podcast_id: Uuid, item: &ParsedItem) -> Option<String> {
    if let Some(guid) = item.guid.as_deref().filter(|g| !g.trim().is_empty()) {
        return Some(guid.to_string());
    }
    if let Some(link) = item.link.as_deref().filter(|l| !l.trim().is_empty()) {
        return Some(link.to_string());
    }
    item.title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(|title| format!("{}-{}", podcast_id, title))
}

pub fn podcast_metadata(feed: &ParsedFeed) -> PodcastMetadata {
    PodcastMetadata {
        title: feed.title.clone(),
        description: feed.description.clone(),
        link: feed.link.clone(),
        language: feed.language.clone(),
        copyright: feed.copyright.clone(),
        author: feed.author.clone(),
        owner_email: feed
            .owner_email
            .clone()
            .or_else(|| feed.managing_editor.clone()),
        image_url: feed.image_url.clone(),
        category: feed.category.clone(),
        explicit: feed.explicit,
    }
}

fn new_episode(podcast_id: Uuid, guid: String, item: &ParsedItem) -> NewEpisode {
    let enclosure = item.enclosure.as_ref();
    NewEpisode {
        id: Uuid::new_v4(),
        podcast_id,
        guid,
        title: item.title.clone(),
        description: item.description.clone(),
        link: item.link.clone(),
        enclosure_url: enclosure.map(|e| e.url.clone()),
        enclosure_type: enclosure.and_then(|e| e.mime_type.clone()),
        enclosure_length: enclosure.and_then(|e| e.length),
        published_at: item.published_at,
        duration: item.duration.clone(),
        episode_number: item.episode_number,
        episode_type: item.episode_type.clone(),
        image_url: item.image_url.clone(),
        explicit: item.explicit,
    }
}

/// Creates or refreshes the podcast for `feed_url`, then inserts every item
/// not yet stored.
///
/// # Errors
///
/// Only a failure to write the podcast row itself. Item failures are logged
/// and counted in [`UpsertOutcome::failed`].
pub async fn upsert_feed<S: Store + ?Sized>(
    store: &S,
    tenant_id: Uuid,
    feed_url: &str,
    feed: &ParsedFeed,
) -> Result<UpsertOutcome, DatabaseError> {
    let metadata = podcast_metadata(feed);

    let (podcast, created) = match store.find_podcast_by_feed_url(feed_url).await? {
        Some(existing) => (store.update_podcast(existing.id, &metadata).await?, false),
        None => {
            let podcast = store
                .insert_podcast(&NewPodcast {
                    id: Uuid::new_v4(),
                    tenant_id,
                    feed_url: feed_url.to_string(),
                    metadata,
                })
                .await?;
            (podcast, true)
        }
    };

    let mut outcome = UpsertOutcome {
        podcast_id: podcast.id,
        created,
        inserted: 0,
        skipped: 0,
        failed: 0,
    };

    for (index, item) in feed.items.iter().enumerate() {
        let Some(key) = episode_key(podcast.id, item) else {
            tracing::warn!(feed = %feed_url, index = index, "Item has no guid, link or title");
            outcome.failed += 1;
            continue;
        };

        match store.find_episode_by_guid(&key).await {
            Ok(Some(_)) => {
                outcome.skipped += 1;
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(feed = %feed_url, guid = %key, error = %e, "Episode lookup failed");
                outcome.failed += 1;
                continue;
            }
        }

        match store.insert_episode(&new_episode(podcast.id, key.clone(), item)).await {
            Ok(_) => outcome.inserted += 1,
            // Another feed stored the same GUID between lookup and insert
            Err(DatabaseError::Conflict(_)) => outcome.skipped += 1,
            Err(e) => {
                tracing::warn!(feed = %feed_url, guid = %key, error = %e, "Episode insert failed");
                outcome.failed += 1;
            }
        }
    }

    tracing::debug!(
        feed = %feed_url,
        podcast_id = %outcome.podcast_id,
        created = outcome.created,
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        failed = outcome.failed,
        "Feed upserted"
    );

    Ok(outcome)
}
