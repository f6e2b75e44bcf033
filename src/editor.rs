//! Reading the current content of an object for editing or download.

use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::EditorError;
use crate::store::{ObjectAttrs, ObjectStore};

#[derive(Debug)]
pub struct FetchedObject {
    pub attrs: ObjectAttrs,
    pub content: Vec<u8>,
}

/// Read the latest generation of `bucket/name`.
///
/// The generation comes from a metadata fetch made immediately before the
/// read, and the read is pinned to it. An unversioned read could be served
/// from a cached copy.
pub async fn fetch_latest(
    store: &dyn ObjectStore,
    bucket: &str,
    name: &str,
) -> Result<FetchedObject, EditorError> {
    let attrs = store
        .object_attrs(bucket, name)
        .await
        .map_err(|source| EditorError::AttributeFetch {
            context: "Getting object attributes",
            source,
        })?;

    let mut reader = store
        .read_generation(bucket, name, attrs.generation)
        .await
        .map_err(|source| EditorError::OpenFailure {
            context: "Opening object",
            source,
        })?;

    let mut content = Vec::with_capacity(usize::try_from(attrs.size).unwrap_or_default());
    reader
        .read_to_end(&mut content)
        .await
        .map_err(|err| EditorError::ReadFailure {
            context: "Reading object",
            source: err.into(),
        })?;
    debug!(bucket = %bucket, key = %name, generation = attrs.generation, size = content.len(), "Fetched object");

    Ok(FetchedObject { attrs, content })
}
