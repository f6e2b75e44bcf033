//! Filesystem-backed object store.
//!
//! Buckets are the top-level directories of the root directory and objects are
//! the files beneath them. An object's generation is its modification time in
//! microseconds; writes set it explicitly so it always moves forward.
//! Detected content types and digests live in `{root}/.bucketedit/{bucket}/{name}.json`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mime_guess::MimeGuess;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, trace, warn};

use super::{
    BucketAttrs, ObjectAttrs, ObjectReader, ObjectStore, ObjectWriter, StoreError,
    validate_bucket_name, validate_object_name,
};
use crate::constants::SIDECAR_DIR;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    generation: u64,
    content_type: String,
    sha256: Option<String>,
}

pub struct FilesystemStore {
    root_dir: PathBuf,
}

impl FilesystemStore {
    pub fn new(root_dir: PathBuf) -> Result<Self, StoreError> {
        if !root_dir.exists() {
            info!(root_dir = ?root_dir, "Root directory does not exist, creating it");
            std::fs::create_dir_all(&root_dir)?;
        }
        if !root_dir.is_dir() {
            return Err(StoreError::Other(format!(
                "{} is not a directory",
                root_dir.display()
            )));
        }
        Ok(Self { root_dir })
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        validate_bucket_name(bucket)?;
        Ok(self.root_dir.join(bucket))
    }

    fn object_path(&self, bucket: &str, name: &str) -> Result<PathBuf, StoreError> {
        validate_object_name(name)?;
        Ok(self.bucket_path(bucket)?.join(name))
    }

    fn sidecar_path(&self, bucket: &str, name: &str) -> PathBuf {
        self.root_dir
            .join(SIDECAR_DIR)
            .join(bucket)
            .join(format!("{name}.json"))
    }

    fn temp_path(&self) -> PathBuf {
        self.root_dir.join(SIDECAR_DIR).join("tmp").join(format!(
            "{}-{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }

    async fn read_sidecar(&self, bucket: &str, name: &str) -> Option<Sidecar> {
        let path = self.sidecar_path(bucket, name);
        let contents = async_fs::read(&path).await.ok()?;
        serde_json::from_slice(&contents)
            .inspect_err(|err| warn!(path = ?path, error = %err, "Ignoring unreadable sidecar"))
            .ok()
    }

    async fn attrs_from_metadata(
        &self,
        bucket: &str,
        name: &str,
        path: &Path,
        metadata: &std::fs::Metadata,
    ) -> Result<ObjectAttrs, StoreError> {
        let generation = generation_of(metadata)?;
        // a sidecar left behind by an older generation says nothing about this one
        let sidecar = self
            .read_sidecar(bucket, name)
            .await
            .filter(|sidecar| sidecar.generation == generation);

        let (content_type, sha256) = match sidecar {
            Some(sidecar) => (sidecar.content_type, sidecar.sha256),
            None => (
                MimeGuess::from_path(path).first_or_octet_stream().to_string(),
                None,
            ),
        };

        Ok(ObjectAttrs {
            bucket: bucket.to_string(),
            name: name.to_string(),
            size: metadata.len(),
            content_type,
            generation,
            updated: DateTime::from_timestamp_micros(generation as i64).unwrap_or_else(Utc::now),
            sha256,
        })
    }
}

fn generation_of(metadata: &std::fs::Metadata) -> Result<u64, StoreError> {
    let modified = metadata.modified()?;
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|err| StoreError::Other(format!("modification time before epoch: {err}")))?;
    Ok(since_epoch.as_micros() as u64)
}

/// The next generation is "now", but never less than one past the previous one.
fn next_generation(previous: Option<u64>) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;
    match previous {
        Some(previous) => now.max(previous + 1),
        None => now,
    }
}

fn not_found_as(err: std::io::Error, what: impl FnOnce() -> String) -> StoreError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(what())
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn list_buckets(&self, project: &str) -> Result<Vec<BucketAttrs>, StoreError> {
        trace!(project = %project, "Filesystem buckets are not scoped by project");
        let mut buckets = Vec::new();
        let mut entries = async_fs::read_dir(&self.root_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            let metadata = entry.metadata().await?;
            buckets.push(BucketAttrs {
                name,
                created: metadata
                    .created()
                    .or_else(|_| metadata.modified())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
            });
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = buckets.len(), "Listed buckets");
        Ok(buckets)
    }

    async fn bucket_attrs(&self, bucket: &str) -> Result<BucketAttrs, StoreError> {
        let path = self.bucket_path(bucket)?;
        let metadata = async_fs::metadata(&path)
            .await
            .map_err(|err| not_found_as(err, || format!("bucket '{bucket}'")))?;
        if !metadata.is_dir() {
            return Err(StoreError::NotFound(format!("bucket '{bucket}'")));
        }
        Ok(BucketAttrs {
            name: bucket.to_string(),
            created: metadata
                .created()
                .or_else(|_| metadata.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectAttrs>, StoreError> {
        let bucket_dir = self.bucket_path(bucket)?;
        if !async_fs::metadata(&bucket_dir)
            .await
            .map_err(|err| not_found_as(err, || format!("bucket '{bucket}'")))?
            .is_dir()
        {
            return Err(StoreError::NotFound(format!("bucket '{bucket}'")));
        }

        let mut found = Vec::new();
        let mut pending = vec![bucket_dir.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = async_fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let Some(key) = path
                    .strip_prefix(&bucket_dir)
                    .ok()
                    .and_then(|relative| relative.to_str())
                    .map(|relative| relative.replace(std::path::MAIN_SEPARATOR, "/"))
                else {
                    warn!(path = ?path, "Skipping object with a non UTF-8 name");
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }
                let metadata = entry.metadata().await?;
                found.push(
                    self.attrs_from_metadata(bucket, &key, &path, &metadata)
                        .await?,
                );
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(bucket = %bucket, prefix = %prefix, count = found.len(), "Listed objects");
        Ok(found)
    }

    async fn object_attrs(&self, bucket: &str, name: &str) -> Result<ObjectAttrs, StoreError> {
        let path = self.object_path(bucket, name)?;
        let metadata = async_fs::metadata(&path)
            .await
            .map_err(|err| not_found_as(err, || format!("object '{bucket}/{name}'")))?;
        if !metadata.is_file() {
            warn!(bucket = %bucket, key = %name, "Path is not a file");
            return Err(StoreError::NotFound(format!("object '{bucket}/{name}'")));
        }
        self.attrs_from_metadata(bucket, name, &path, &metadata)
            .await
    }

    async fn read_generation(
        &self,
        bucket: &str,
        name: &str,
        generation: u64,
    ) -> Result<ObjectReader, StoreError> {
        let path = self.object_path(bucket, name)?;
        let file = async_fs::File::open(&path)
            .await
            .map_err(|err| not_found_as(err, || format!("object '{bucket}/{name}'")))?;
        // the handle pins the inode, so its metadata is the generation we will read
        let current = generation_of(&file.metadata().await?)?;
        if current != generation {
            debug!(bucket = %bucket, key = %name, requested = generation, current, "Generation mismatch");
            return Err(StoreError::NotFound(format!(
                "generation {generation} of '{bucket}/{name}'"
            )));
        }
        Ok(Box::new(file))
    }

    async fn create_writer(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        let final_path = self.object_path(bucket, name)?;
        self.bucket_attrs(bucket).await?;

        let previous_generation = match self.object_attrs(bucket, name).await {
            Ok(attrs) => Some(attrs.generation),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err),
        };

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        let file = async_fs::File::create(&temp_path).await?;
        debug!(bucket = %bucket, key = %name, temp_path = ?temp_path, "Opened object writer");

        Ok(Box::new(FilesystemWriter {
            file,
            temp: TempFile::new(temp_path),
            final_path,
            sidecar_path: self.sidecar_path(bucket, name),
            bucket: bucket.to_string(),
            name: name.to_string(),
            content_type: content_type.to_string(),
            previous_generation,
            hasher: Sha256::new(),
        }))
    }
}

/// Removes the temp file when dropped, unless it was renamed into place.
struct TempFile {
    path: PathBuf,
    persisted: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => trace!(temp_path = ?self.path, "Removed abandoned temp file"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(temp_path = ?self.path, error = %err, "Failed to remove temp file"),
        }
    }
}

// `file` is declared before `temp` so the handle closes before the unlink
struct FilesystemWriter {
    file: async_fs::File,
    temp: TempFile,
    final_path: PathBuf,
    sidecar_path: PathBuf,
    bucket: String,
    name: String,
    content_type: String,
    previous_generation: Option<u64>,
    hasher: Sha256,
}

impl FilesystemWriter {
    async fn commit(self) -> Result<ObjectAttrs, StoreError> {
        let FilesystemWriter {
            mut file,
            mut temp,
            final_path,
            sidecar_path,
            bucket,
            name,
            content_type,
            previous_generation,
            hasher,
        } = self;

        file.flush().await?;
        let generation = next_generation(previous_generation);
        let std_file = file.into_std().await;
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std_file.set_modified(UNIX_EPOCH + Duration::from_micros(generation))?;
            std_file.sync_all()
        })
        .await
        .map_err(|err| StoreError::Other(format!("sync task failed: {err}")))??;

        if let Some(parent) = final_path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        async_fs::rename(&temp.path, &final_path).await?;
        temp.persisted = true;

        let metadata = async_fs::metadata(&final_path).await?;
        let stored_generation = generation_of(&metadata)?;
        if stored_generation != generation {
            warn!(
                bucket = %bucket,
                key = %name,
                expected = generation,
                stored = stored_generation,
                "Filesystem did not keep the full modification time precision"
            );
        }

        // only describe the generation that actually landed
        let sha256 = hex::encode(hasher.finalize());
        let sidecar = Sidecar {
            generation: stored_generation,
            content_type: content_type.clone(),
            sha256: Some(sha256.clone()),
        };
        if let Err(err) = write_sidecar(&sidecar_path, &sidecar).await {
            // the object is in place, readers fall back to a guessed type
            warn!(bucket = %bucket, key = %name, error = %err, "Failed to write sidecar");
        }
        debug!(bucket = %bucket, key = %name, generation = stored_generation, size = metadata.len(), "Object written");

        Ok(ObjectAttrs {
            bucket,
            name,
            size: metadata.len(),
            content_type,
            generation: stored_generation,
            updated: DateTime::from_timestamp_micros(stored_generation as i64)
                .unwrap_or_else(Utc::now),
            sha256: Some(sha256),
        })
    }
}

async fn write_sidecar(path: &Path, sidecar: &Sidecar) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec(sidecar)
        .map_err(|err| StoreError::Other(format!("failed to encode sidecar: {err}")))?;
    async_fs::write(path, json).await?;
    Ok(())
}

#[async_trait]
impl ObjectWriter for FilesystemWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StoreError> {
        self.file.write_all(buf).await?;
        self.hasher.update(buf);
        Ok(buf.len())
    }

    async fn close(self: Box<Self>) -> Result<ObjectAttrs, StoreError> {
        (*self).commit().await
    }
}
