//! Bucket and object enumeration for the selection pages.

use tracing::debug;

use crate::config::EditorConfig;
use crate::error::EditorError;
use crate::store::{BucketAttrs, ObjectStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    pub name: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub name: String,
    pub size: u64,
    pub size_formatted: String,
}

/// Enumerate the buckets of the configured project, restricted to the pinned
/// bucket when there is one. `selected` is marked in the result.
pub async fn list_buckets(
    store: &dyn ObjectStore,
    config: &EditorConfig,
    selected: Option<&str>,
) -> Result<Vec<BucketEntry>, EditorError> {
    let buckets = store
        .list_buckets(&config.project)
        .await
        .map_err(|source| EditorError::ListFailure {
            context: "Listing buckets",
            source,
        })?;
    debug!(project = %config.project, count = buckets.len(), "Listed buckets");

    Ok(buckets
        .into_iter()
        .filter(|bucket| {
            config
                .fixed_bucket
                .as_deref()
                .is_none_or(|fixed| fixed == bucket.name)
        })
        .map(|bucket| BucketEntry {
            selected: selected == Some(bucket.name.as_str()),
            name: bucket.name,
        })
        .collect())
}

pub async fn bucket_attrs(
    store: &dyn ObjectStore,
    bucket: &str,
) -> Result<BucketAttrs, EditorError> {
    store
        .bucket_attrs(bucket)
        .await
        .map_err(|source| EditorError::AttributeFetch {
            context: "Getting bucket attributes",
            source,
        })
}

/// Every object in `bucket`, flat, in name order.
pub async fn list_objects(
    store: &dyn ObjectStore,
    bucket: &str,
) -> Result<Vec<ObjectEntry>, EditorError> {
    let objects = store
        .list_objects(bucket, "")
        .await
        .map_err(|source| EditorError::ListFailure {
            context: "Listing objects",
            source,
        })?;
    Ok(objects
        .into_iter()
        .map(|object| ObjectEntry {
            size_formatted: format_size(object.size),
            size: object.size,
            name: object.name,
        })
        .collect())
}

/// Format file size in human-readable format
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{TEST_BUCKET, TEST_OTHER_BUCKET};
    use crate::store::MemoryStore;

    fn config(fixed_bucket: Option<&str>) -> EditorConfig {
        EditorConfig {
            project: String::new(),
            fixed_bucket: fixed_bucket.map(str::to_string),
            base_path: "/".to_string(),
            realm: "test".to_string(),
            request_timeout: std::time::Duration::from_secs(5),
            max_form_size: 1024,
        }
    }

    async fn store() -> MemoryStore {
        let store = MemoryStore::default();
        for bucket in [TEST_BUCKET, TEST_OTHER_BUCKET] {
            store.create_bucket(bucket).await.expect("bucket");
        }
        store
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(11), "11 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[tokio::test]
    async fn test_list_buckets_marks_selection() {
        let store = store().await;
        let buckets = list_buckets(&store, &config(None), Some(TEST_OTHER_BUCKET))
            .await
            .expect("list");
        assert_eq!(
            buckets,
            vec![
                BucketEntry {
                    name: TEST_BUCKET.to_string(),
                    selected: false
                },
                BucketEntry {
                    name: TEST_OTHER_BUCKET.to_string(),
                    selected: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_buckets_restricted_to_pinned() {
        let store = store().await;
        let buckets = list_buckets(&store, &config(Some(TEST_BUCKET)), None)
            .await
            .expect("list");
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].name, TEST_BUCKET);
    }

    #[tokio::test]
    async fn test_list_objects_sizes() {
        let store = store().await;
        store
            .put_object(TEST_BUCKET, "notes.txt", "text/plain", "hello world")
            .await
            .expect("put");
        let objects = list_objects(&store, TEST_BUCKET).await.expect("list");
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].size, 11);
        assert_eq!(objects[0].size_formatted, "11 B");
    }

    #[tokio::test]
    async fn test_missing_bucket_attrs() {
        let store = store().await;
        let err = bucket_attrs(&store, "missing").await.expect_err("missing");
        assert_eq!(err.to_string(), "Getting bucket attributes - bucket 'missing' not found");
    }
}
