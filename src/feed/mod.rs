//! Feed side of the pipeline: where URLs come from, how feeds are fetched
//! and parsed, and how they land in storage.
//!
//! - [`collector`] - Reads URLs from the feed list and OPML files
//! - [`opml`] - OPML outline tree and its pre-order walk
//! - [`fetcher`] - HTTP retrieval with retry, validation and size limits
//! - [`parser`] - RSS (iTunes, Dublin Core) and Atom into [`ParsedFeed`]
//! - [`upsert`] - Idempotent podcast/episode writes

pub mod collector;
pub mod fetcher;
pub mod opml;
pub mod parser;
pub mod upsert;

pub use collector::{collect_urls, parse_feed_list, CollectError};
pub use fetcher::{build_client, fetch_feed, sanitize_feed_body, FetchError};
pub use opml::{parse_outlines, walk, OpmlError, Outline};
pub use parser::{parse_feed, ParseError, ParsedEnclosure, ParsedFeed, ParsedItem};
pub use upsert::{episode_key, upsert_feed, UpsertOutcome};
