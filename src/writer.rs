//! Saving submitted content over an object.

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::EditorError;
use crate::sniff::detect_content_type;
use crate::store::{ObjectAttrs, ObjectStore};

/// Replace `bucket/name` with `content`.
///
/// Empty submissions are refused before the store is contacted. The stored
/// content type is sniffed from the bytes. Once the write is finalized, the
/// number of bytes the store accepted must equal the number submitted, and
/// so must the digest when the store reports one. A failed check does not
/// roll anything back.
pub async fn save(
    store: &dyn ObjectStore,
    bucket: &str,
    name: &str,
    content: &[u8],
) -> Result<ObjectAttrs, EditorError> {
    if content.is_empty() {
        return Err(EditorError::EmptySubmission);
    }

    let content_type = detect_content_type(content);
    let mut writer = store
        .create_writer(bucket, name, content_type)
        .await
        .map_err(|source| EditorError::WriteFailure {
            context: "Opening object for writing",
            source,
        })?;

    let transferred = writer
        .write(content)
        .await
        .map_err(|source| EditorError::WriteFailure {
            context: "Writing object",
            source,
        })?;

    let attrs = writer
        .close()
        .await
        .map_err(|source| EditorError::FinalizeFailure {
            context: "Closing object",
            source,
        })?;

    let persisted = if transferred != content.len() {
        transferred
    } else {
        usize::try_from(attrs.size).unwrap_or(usize::MAX)
    };
    if persisted != content.len() {
        warn!(bucket = %bucket, key = %name, submitted = content.len(), persisted, "Object length mismatch after write");
        return Err(EditorError::LengthMismatch {
            submitted: content.len(),
            persisted,
        });
    }

    if let Some(stored_digest) = &attrs.sha256 {
        let submitted_digest = hex::encode(Sha256::digest(content));
        if !stored_digest.eq_ignore_ascii_case(&submitted_digest) {
            warn!(bucket = %bucket, key = %name, "Object digest mismatch after write");
            return Err(EditorError::DigestMismatch {
                submitted: submitted_digest,
                persisted: stored_digest.clone(),
            });
        }
    }

    debug!(bucket = %bucket, key = %name, generation = attrs.generation, content_type = %attrs.content_type, size = attrs.size, "Saved object");
    Ok(attrs)
}
