//! podcatch: podcast feed ingestion and media mirroring.
//!
//! The crate is split along the pipeline it implements:
//!
//! - [`feed`] - URL collection, OPML walking, fetching, parsing and upserting feeds
//! - [`storage`] - The relational store (PostgreSQL) behind the [`storage::Store`] trait
//! - [`media`] - Episode media download, staging and upload to object storage
//! - [`pipeline`] - The two run modes (ingest and download) wired together
//! - [`config`] - Layered configuration (defaults, TOML file, environment)
//! - [`retry`] - The shared exponential backoff policy

pub mod config;
pub mod feed;
pub mod media;
pub mod pipeline;
pub mod retry;
pub mod storage;
