//! Object store capability.
//!
//! The editor only ever talks to storage through [`ObjectStore`], so any
//! backend offering bucket/object listing, attribute fetches, reads pinned to a
//! generation and whole-object writes can be plugged in.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use tokio::io::AsyncRead;

use crate::cli::Cli;
use crate::error::EditorError;

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

/// Attributes of a bucket, fetched on demand and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketAttrs {
    pub name: String,
    pub created: DateTime<Utc>,
}

/// Attributes of a single object at its current generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttrs {
    pub bucket: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    /// Store-assigned version, strictly increasing on every write of the object.
    pub generation: u64,
    pub updated: DateTime<Utc>,
    /// Hex SHA-256 of the content, when the backend tracks it.
    pub sha256: Option<String>,
}

/// Content of one object generation.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    InvalidName(String),
    Io(std::io::Error),
    Other(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) => true,
            StoreError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "{what} not found"),
            StoreError::InvalidName(msg) => write!(f, "invalid name: {msg}"),
            StoreError::Io(err) => write!(f, "{err}"),
            StoreError::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Enumerate the buckets visible under `project`.
    async fn list_buckets(&self, project: &str) -> Result<Vec<BucketAttrs>, StoreError>;

    async fn bucket_attrs(&self, bucket: &str) -> Result<BucketAttrs, StoreError>;

    /// Enumerate every object in `bucket` whose name starts with `prefix`, sorted by name.
    async fn list_objects(&self, bucket: &str, prefix: &str)
    -> Result<Vec<ObjectAttrs>, StoreError>;

    /// Current attributes of an object, including its latest generation.
    async fn object_attrs(&self, bucket: &str, name: &str) -> Result<ObjectAttrs, StoreError>;

    /// Open exactly `generation` of an object. Fails if that generation is not
    /// available, it never falls back to whatever copy happens to be current.
    async fn read_generation(
        &self,
        bucket: &str,
        name: &str,
        generation: u64,
    ) -> Result<ObjectReader, StoreError>;

    /// Start a write that replaces the object once [`ObjectWriter::close`] succeeds.
    async fn create_writer(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StoreError>;
}

#[async_trait]
pub trait ObjectWriter: Send {
    /// Transfer some of `buf`, returning how many bytes were accepted.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StoreError>;

    /// Finalize the write and return the attributes of the new generation.
    async fn close(self: Box<Self>) -> Result<ObjectAttrs, StoreError>;
}

/// Which backend the server stores objects in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Buckets are directories under the root directory
    Filesystem,
    /// Ephemeral in-process store, contents are lost on exit
    Memory,
}

/// Build the configured backend. The memory backend starts out empty, apart
/// from the pinned bucket when there is one.
pub async fn from_cli(cli: &Cli) -> Result<Arc<dyn ObjectStore>, EditorError> {
    match cli.backend {
        Backend::Filesystem => Ok(Arc::new(
            FilesystemStore::new(cli.root_dir.clone())
                .map_err(|err| EditorError::StoreUnavailable(err.to_string()))?,
        )),
        Backend::Memory => {
            let store = MemoryStore::default();
            if let Some(bucket) = cli.bucket.as_deref().filter(|b| !b.is_empty()) {
                store
                    .create_bucket(bucket)
                    .await
                    .map_err(|err| EditorError::StoreUnavailable(err.to_string()))?;
            }
            Ok(Arc::new(store))
        }
    }
}

/// Object names end up in paths and URLs, so reject the ones that can escape a bucket.
pub(crate) fn validate_object_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidName("object name is empty".to_string()));
    }
    if name.len() > 1024 {
        return Err(StoreError::InvalidName(format!(
            "object name is {} bytes, max 1024",
            name.len()
        )));
    }
    if name.starts_with('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::InvalidName(format!(
            "'{name}' is not a valid object name"
        )));
    }
    Ok(())
}

pub(crate) fn validate_bucket_name(bucket: &str) -> Result<(), StoreError> {
    if bucket.is_empty() || bucket.len() > 63 {
        return Err(StoreError::InvalidName(
            "bucket name must be between 1 and 63 characters".to_string(),
        ));
    }
    if bucket.starts_with('.')
        || !bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(StoreError::InvalidName(format!(
            "'{bucket}' is not a valid bucket name"
        )));
    }
    Ok(())
}
