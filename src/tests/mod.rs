
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use tempfile::TempDir;
use tokio::fs;
use tokio::io::{AsyncRead, ReadBuf};
use tracing::debug;

use crate::config::EditorConfig;
use crate::constants::{TEST_BUCKET, TEST_OBJECT, TEST_OTHER_BUCKET, TEST_PASSWORD, TEST_USER};
use crate::credentials::{Credential, CredentialStore};
use crate::request_handler::RequestHandler;
use crate::store::{
    BucketAttrs, MemoryStore, ObjectAttrs, ObjectReader, ObjectStore, ObjectWriter, StoreError,
};

pub(crate) const MULTIPART_BOUNDARY: &str = "bucketedit-test-boundary";

pub(crate) async fn copy_dir_all(src: PathBuf, dst: PathBuf) -> std::io::Result<()> {
    let mut targets = vec![(src, dst)];
    let mut dirs_done = HashSet::new();

    while let Some((src_dir, dest_dir)) = targets.pop() {
        if !dirs_done.insert(src_dir.clone()) {
            continue;
        }
        debug!(src = %src_dir.display(), dest = %dest_dir.display(), "Copying directory");
        fs::create_dir_all(&dest_dir).await?;
        let mut dir_reader = fs::read_dir(&src_dir).await?;
        while let Some(entry) = dir_reader.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                targets.push((entry.path(), dest_dir.join(entry.file_name())));
            } else {
                fs::copy(entry.path(), dest_dir.join(entry.file_name())).await?;
            }
        }
    }
    Ok(())
}

/// A scratch copy of `testfiles/`, usable as a filesystem backend root.
pub(crate) async fn setup_test_files() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    copy_dir_all("testfiles".into(), temp_dir.path().into())
        .await
        .expect("Failed to copy test files");
    temp_dir
}

pub(crate) fn test_config(fixed_bucket: Option<&str>) -> EditorConfig {
    EditorConfig {
        project: String::new(),
        fixed_bucket: fixed_bucket.map(str::to_string),
        base_path: "/".to_string(),
        realm: "bucketedit".to_string(),
        request_timeout: Duration::from_secs(5),
        max_form_size: 1 << 20,
    }
}

pub(crate) fn test_credentials() -> Arc<CredentialStore> {
    Arc::new(CredentialStore::from_credentials(vec![
        Credential::from_password(TEST_USER, "pepper", TEST_PASSWORD),
    ]))
}

/// Memory store holding `demo/notes.txt = "hello"` and an empty `other` bucket.
pub(crate) async fn demo_store() -> MemoryStore {
    let store = MemoryStore::default();
    for bucket in [TEST_BUCKET, TEST_OTHER_BUCKET] {
        store
            .create_bucket(bucket)
            .await
            .expect("Failed to create bucket");
    }
    store
        .put_object(
            TEST_BUCKET,
            TEST_OBJECT,
            "text/plain; charset=utf-8",
            "hello",
        )
        .await
        .expect("Failed to seed object");
    store
}

pub(crate) fn test_handler(store: Arc<dyn ObjectStore>, config: EditorConfig) -> RequestHandler {
    RequestHandler::new(store, Arc::new(config), test_credentials())
}

pub(crate) fn basic_auth(login: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{login}:{password}")))
}

pub(crate) fn remote_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

/// Authenticated request with an optional body of the given content type.
pub(crate) fn request(
    method: Method,
    uri: &str,
    body: Option<(&'static str, Bytes)>,
) -> Request<Full<Bytes>> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, basic_auth(TEST_USER, TEST_PASSWORD));
    let request = match body {
        Some((content_type, body)) => builder
            .header(CONTENT_TYPE, content_type)
            .body(Full::new(body)),
        None => builder.body(Full::new(Bytes::new())),
    };
    request.expect("Failed to build request")
}

pub(crate) fn multipart_content_type() -> &'static str {
    "multipart/form-data; boundary=bucketedit-test-boundary"
}

pub(crate) fn multipart_body(fields: &[(&str, &[u8])]) -> Bytes {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(value);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    Bytes::from(body)
}

pub(crate) async fn body_string(response: Response<Full<Bytes>>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("Body is not valid UTF-8")
}

/// Wraps a store and records how the editor uses it.
#[derive(Default)]
pub(crate) struct StoreRecorder {
    /// Calls of any kind.
    pub(crate) calls: AtomicUsize,
    pub(crate) writers_created: AtomicUsize,
    /// Generations handed out by `object_attrs`, in order.
    pub(crate) attrs_generations: Mutex<Vec<u64>>,
    /// Generations requested from `read_generation`, in order.
    pub(crate) read_generations: Mutex<Vec<u64>>,
    /// Make writers accept one byte less than they are given.
    pub(crate) short_writes: AtomicBool,
    /// Stall every call by this long.
    pub(crate) delay: Mutex<Option<Duration>>,
    /// Stall `close` on writers by this long.
    pub(crate) close_delay: Mutex<Option<Duration>>,
    /// `read_generation` fails outright.
    pub(crate) fail_open: AtomicBool,
    /// `read_generation` succeeds but the reader errors.
    pub(crate) fail_drain: AtomicBool,
    /// Writers reject every `write`.
    pub(crate) fail_writes: AtomicBool,
    /// Writers report a digest that does not match what they stored.
    pub(crate) corrupt_digest: AtomicBool,
}

/// A reader that fails on the first poll.
struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "stream reset by peer",
        )))
    }
}

pub(crate) struct RecordingStore<S> {
    inner: S,
    pub(crate) recorder: Arc<StoreRecorder>,
}

impl<S: ObjectStore> RecordingStore<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            recorder: Arc::new(StoreRecorder::default()),
        }
    }

    async fn enter(&self) {
        self.recorder.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.recorder.delay.lock().expect("recorder lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for RecordingStore<S> {
    async fn list_buckets(&self, project: &str) -> Result<Vec<BucketAttrs>, StoreError> {
        self.enter().await;
        self.inner.list_buckets(project).await
    }

    async fn bucket_attrs(&self, bucket: &str) -> Result<BucketAttrs, StoreError> {
        self.enter().await;
        self.inner.bucket_attrs(bucket).await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectAttrs>, StoreError> {
        self.enter().await;
        self.inner.list_objects(bucket, prefix).await
    }

    async fn object_attrs(&self, bucket: &str, name: &str) -> Result<ObjectAttrs, StoreError> {
        self.enter().await;
        let attrs = self.inner.object_attrs(bucket, name).await?;
        self.recorder
            .attrs_generations
            .lock()
            .expect("recorder lock poisoned")
            .push(attrs.generation);
        Ok(attrs)
    }

    async fn read_generation(
        &self,
        bucket: &str,
        name: &str,
        generation: u64,
    ) -> Result<ObjectReader, StoreError> {
        self.enter().await;
        self.recorder
            .read_generations
            .lock()
            .expect("recorder lock poisoned")
            .push(generation);
        if self.recorder.fail_open.load(Ordering::SeqCst) {
            return Err(StoreError::Other("backend unavailable".to_string()));
        }
        let reader = self.inner.read_generation(bucket, name, generation).await?;
        if self.recorder.fail_drain.load(Ordering::SeqCst) {
            return Ok(Box::new(BrokenReader));
        }
        Ok(reader)
    }

    async fn create_writer(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        self.enter().await;
        self.recorder.writers_created.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.create_writer(bucket, name, content_type).await?;
        Ok(Box::new(RecordingWriter {
            inner,
            recorder: self.recorder.clone(),
        }))
    }
}

struct RecordingWriter {
    inner: Box<dyn ObjectWriter>,
    recorder: Arc<StoreRecorder>,
}

#[async_trait]
impl ObjectWriter for RecordingWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StoreError> {
        if self.recorder.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Other("quota exceeded".to_string()));
        }
        let buf = match self.recorder.short_writes.load(Ordering::SeqCst) {
            true => &buf[..buf.len().saturating_sub(1)],
            false => buf,
        };
        self.inner.write(buf).await
    }

    async fn close(self: Box<Self>) -> Result<ObjectAttrs, StoreError> {
        let delay = *self.recorder.close_delay.lock().expect("recorder lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut attrs = self.inner.close().await?;
        if self.recorder.corrupt_digest.load(Ordering::SeqCst) {
            attrs.sha256 = Some("0".repeat(64));
        }
        Ok(attrs)
    }
}
