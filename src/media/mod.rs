//! Episode media: naming, local staging, object storage and the downloader
//! that ties them together.

mod downloader;
mod naming;
mod object_store;
mod staging;

pub use downloader::{
    DownloadError, DownloadSummary, MediaDownloader, EPISODE_DELAY, MEDIA_TIMEOUT,
};
pub use naming::{content_type_for, extension_for, object_key, AUDIO_EXTENSIONS};
pub use object_store::{
    ensure_bucket, MemoryObjectStore, ObjectStore, S3Store, StorageError, StoredObject,
};
pub use staging::StagedFile;
