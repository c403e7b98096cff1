//! Object storage the downloader uploads into.
//!
//! [`S3Store`] talks to S3 or MinIO. [`MemoryObjectStore`] keeps objects in
//! process and can be told to fail, for tests.

use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use s3::BucketConfiguration;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

use crate::config::StorageConfig;
use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Bucket bootstrap failed; nothing can be uploaded this run.
    #[error("Object storage unavailable: {0}")]
    Unavailable(String),

    #[error("Object storage request failed: {0}")]
    Request(String),

    #[error("Object storage returned status {code}")]
    Status { code: u16 },

    #[error("Failed to read staged file: {0}")]
    Io(#[from] std::io::Error),
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        match self {
            StorageError::Request(_) => true,
            StorageError::Status { code } => *code == 429 || *code >= 500,
            StorageError::Unavailable(_) | StorageError::Io(_) => false,
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;
    async fn bucket_exists(&self) -> Result<bool, StorageError>;
    async fn create_bucket(&self) -> Result<(), StorageError>;
    /// Upload the file at `path` under `key`, streaming it from disk.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str)
        -> Result<(), StorageError>;
}

/// Makes sure the bucket exists, creating it when absent.
///
/// Every failure here is [`StorageError::Unavailable`].
pub async fn ensure_bucket<O: ObjectStore + ?Sized>(store: &O) -> Result<(), StorageError> {
    let exists = store
        .bucket_exists()
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;

    if exists {
        tracing::debug!(bucket = %store.bucket(), "Bucket exists");
        return Ok(());
    }

    store
        .create_bucket()
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;
    tracing::info!(bucket = %store.bucket(), "Created bucket");
    Ok(())
}

/// S3-compatible store addressed with path-style URLs, as MinIO expects.
pub struct S3Store {
    bucket: Box<Bucket>,
    name: String,
    region: Region,
    credentials: Credentials,
}

impl S3Store {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        use secrecy::ExposeSecret;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint_url(),
        };
        let credentials = Credentials::new(
            Some(config.access_key.as_str()),
            Some(config.secret_key.expose_secret()),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Request(e.to_string()))?;

        let bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|e| StorageError::Request(e.to_string()))?
            .with_path_style();

        Ok(Self {
            bucket,
            name: config.bucket.clone(),
            region,
            credentials,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        self.bucket
            .exists()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))
    }

    async fn create_bucket(&self) -> Result<(), StorageError> {
        let response = Bucket::create_with_path_style(
            &self.name,
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await
        .map_err(|e| StorageError::Request(e.to_string()))?;

        if !response.success() {
            return Err(StorageError::Status {
                code: response.response_code,
            });
        }
        Ok(())
    }

    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let mut file = tokio::fs::File::open(path).await?;
        let response = self
            .bucket
            .put_object_stream_with_content_type(&mut file, key, content_type)
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(StorageError::Status { code });
        }
        Ok(())
    }
}

/// One object held by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// In-process object store.
#[derive(Default)]
pub struct MemoryObjectStore {
    name: String,
    bucket_created: AtomicBool,
    unavailable: AtomicBool,
    failing_uploads: AtomicUsize,
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    /// A store whose bucket does not exist yet.
    pub fn new(bucket: &str) -> Self {
        Self {
            name: bucket.to_string(),
            ..Default::default()
        }
    }

    /// Make every bucket operation fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every upload fail with a 503.
    pub fn set_fail_uploads(&self, fail: bool) {
        let count = if fail { usize::MAX } else { 0 };
        self.failing_uploads.store(count, Ordering::SeqCst);
    }

    /// Make only the next `count` uploads fail with a 503.
    pub fn fail_next_uploads(&self, count: usize) {
        self.failing_uploads.store(count, Ordering::SeqCst);
    }

    pub fn bucket_created(&self) -> bool {
        self.bucket_created.load(Ordering::SeqCst)
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Request("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        self.check_available()?;
        Ok(self.bucket_created())
    }

    async fn create_bucket(&self) -> Result<(), StorageError> {
        self.check_available()?;
        self.bucket_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.check_available()?;
        let failing = self
            .failing_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if failing {
            return Err(StorageError::Status { code: 503 });
        }
        if !self.bucket_created() {
            return Err(StorageError::Status { code: 404 });
        }

        let body = tokio::fs::read(path).await?;
        self.lock().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}
