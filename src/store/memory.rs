//! In-process object store.
//!
//! Keeps only the current generation of every object. Used for ephemeral
//! deployments and as the backend in tests.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use hyper::body::Bytes;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    BucketAttrs, ObjectAttrs, ObjectReader, ObjectStore, ObjectWriter, StoreError,
    validate_bucket_name, validate_object_name,
};

#[derive(Debug)]
struct StoredObject {
    attrs: ObjectAttrs,
    data: Bytes,
}

#[derive(Debug)]
struct MemoryBucket {
    attrs: BucketAttrs,
    objects: BTreeMap<String, StoredObject>,
}

type Buckets = Arc<RwLock<BTreeMap<String, MemoryBucket>>>;

#[derive(Default, Clone)]
pub struct MemoryStore {
    buckets: Buckets,
    last_generation: Arc<AtomicU64>,
}

impl MemoryStore {
    pub async fn create_bucket(&self, bucket: &str) -> Result<BucketAttrs, StoreError> {
        validate_bucket_name(bucket)?;
        let mut buckets = self.buckets.write().await;
        let entry = buckets
            .entry(bucket.to_string())
            .or_insert_with(|| MemoryBucket {
                attrs: BucketAttrs {
                    name: bucket.to_string(),
                    created: Utc::now(),
                },
                objects: BTreeMap::new(),
            });
        debug!(bucket = %bucket, "Created in-memory bucket");
        Ok(entry.attrs.clone())
    }

    /// Store `data` as a new generation of `bucket/name`.
    pub async fn put_object(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
        data: impl Into<Bytes>,
    ) -> Result<ObjectAttrs, StoreError> {
        commit(
            &self.buckets,
            &self.last_generation,
            bucket,
            name,
            content_type,
            data.into(),
        )
        .await
    }
}

async fn commit(
    buckets: &Buckets,
    last_generation: &AtomicU64,
    bucket: &str,
    name: &str,
    content_type: &str,
    data: Bytes,
) -> Result<ObjectAttrs, StoreError> {
    validate_object_name(name)?;
    let mut buckets = buckets.write().await;
    let target = buckets
        .get_mut(bucket)
        .ok_or_else(|| StoreError::NotFound(format!("bucket '{bucket}'")))?;

    let attrs = ObjectAttrs {
        bucket: bucket.to_string(),
        name: name.to_string(),
        size: data.len() as u64,
        content_type: content_type.to_string(),
        generation: last_generation.fetch_add(1, Ordering::SeqCst) + 1,
        updated: Utc::now(),
        sha256: Some(hex::encode(Sha256::digest(&data))),
    };
    debug!(bucket = %bucket, key = %name, generation = attrs.generation, size = attrs.size, "Committed object");
    target.objects.insert(
        name.to_string(),
        StoredObject {
            attrs: attrs.clone(),
            data,
        },
    );
    Ok(attrs)
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_buckets(&self, _project: &str) -> Result<Vec<BucketAttrs>, StoreError> {
        let buckets = self.buckets.read().await;
        Ok(buckets.values().map(|b| b.attrs.clone()).collect())
    }

    async fn bucket_attrs(&self, bucket: &str) -> Result<BucketAttrs, StoreError> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .map(|b| b.attrs.clone())
            .ok_or_else(|| StoreError::NotFound(format!("bucket '{bucket}'")))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectAttrs>, StoreError> {
        let buckets = self.buckets.read().await;
        let target = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NotFound(format!("bucket '{bucket}'")))?;
        Ok(target
            .objects
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(_, object)| object.attrs.clone())
            .collect())
    }

    async fn object_attrs(&self, bucket: &str, name: &str) -> Result<ObjectAttrs, StoreError> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NotFound(format!("bucket '{bucket}'")))?
            .objects
            .get(name)
            .map(|object| object.attrs.clone())
            .ok_or_else(|| StoreError::NotFound(format!("object '{bucket}/{name}'")))
    }

    async fn read_generation(
        &self,
        bucket: &str,
        name: &str,
        generation: u64,
    ) -> Result<ObjectReader, StoreError> {
        let buckets = self.buckets.read().await;
        let object = buckets
            .get(bucket)
            .and_then(|b| b.objects.get(name))
            .filter(|object| object.attrs.generation == generation)
            .ok_or_else(|| {
                StoreError::NotFound(format!("generation {generation} of '{bucket}/{name}'"))
            })?;
        Ok(Box::new(Cursor::new(object.data.clone())))
    }

    async fn create_writer(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        validate_object_name(name)?;
        Ok(Box::new(MemoryWriter {
            buckets: self.buckets.clone(),
            last_generation: self.last_generation.clone(),
            bucket: bucket.to_string(),
            name: name.to_string(),
            content_type: content_type.to_string(),
            buffer: Vec::new(),
        }))
    }
}

struct MemoryWriter {
    buckets: Buckets,
    last_generation: Arc<AtomicU64>,
    bucket: String,
    name: String,
    content_type: String,
    buffer: Vec<u8>,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StoreError> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn close(self: Box<Self>) -> Result<ObjectAttrs, StoreError> {
        let writer = *self;
        commit(
            &writer.buckets,
            &writer.last_generation,
            &writer.bucket,
            &writer.name,
            &writer.content_type,
            Bytes::from(writer.buffer),
        )
        .await
    }
}
