//! Editor request dispatch.
//!
//! Authenticates, parses parameters, resolves the bucket and runs the
//! requested operation, all under the per-request deadline. Every failure is
//! turned into a response here.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use tracing::{Span, debug, instrument, warn};

use crate::auth::{AuthGate, unauthorized_response};
use crate::browser::{self, ObjectEntry};
use crate::config::EditorConfig;
use crate::constants::{
    PARAM_BUCKET, PARAM_FILE, PARAM_OPERATION, TRACE_BUCKET, TRACE_KEY, TRACE_OPERATION,
    TRACE_STATUS_CODE, TRACE_USER,
};
use crate::credentials::CredentialStore;
use crate::editor::fetch_latest;
use crate::error::EditorError;
use crate::store::ObjectStore;
use crate::web::form::{EditorParams, Operation};
use crate::web::templates::{EditTemplate, ListingTemplate};
use crate::web::{build_download_response, build_html_response, editor_url, redirect_see_other};
use crate::writer;

pub struct RequestHandler {
    store: Arc<dyn ObjectStore>,
    config: Arc<EditorConfig>,
    auth: AuthGate,
}

impl RequestHandler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        config: Arc<EditorConfig>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            store,
            config,
            auth: AuthGate::new(credentials),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Main request handler - never fails, errors become responses
    #[instrument(
        level = "info",
        skip_all,
        fields(method = %req.method(), remote_addr = %remote_addr, operation, bucket, key, user, status_code)
    )]
    pub async fn handle_request<B>(
        &self,
        req: Request<B>,
        remote_addr: SocketAddr,
    ) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let deadline = self.config.request_timeout;
        let result = match tokio::time::timeout(deadline, self.dispatch(req)).await {
            Ok(result) => result,
            Err(_) => Err(EditorError::Timeout(deadline)),
        };

        let response = match result {
            Ok(response) => response,
            Err(EditorError::AuthenticationFailure) => {
                debug!("Rejected unauthenticated request");
                unauthorized_response(&self.config.realm)
            }
            Err(err) => {
                warn!(error = %err, "Request failed");
                err.into()
            }
        };
        Span::current().record(TRACE_STATUS_CODE, response.status().as_u16());
        Ok(response)
    }

    async fn dispatch<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, EditorError>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let span = Span::current();

        if let Some(user) = self.auth.authorize(req.headers())? {
            span.record(TRACE_USER, user.as_str());
        }

        let (parts, body) = req.into_parts();
        let body = read_body(body, self.config.max_form_size).await?;
        let params = EditorParams::parse(parts.uri.query(), &parts.headers, body).await?;

        let operation = params.operation();
        let bucket = self.config.resolve_bucket(params.bucket.clone());
        span.record(TRACE_OPERATION, operation.as_ref());
        if let Some(bucket) = &bucket {
            span.record(TRACE_BUCKET, bucket.as_str());
        }
        if let Some(file) = &params.file {
            span.record(TRACE_KEY, file.as_str());
        }

        match operation {
            Operation::Default | Operation::ListObjects => self.listing(bucket.as_deref()).await,
            Operation::Download => {
                let (bucket, file) = required_target(bucket.as_deref(), params.file.as_deref())?;
                browser::bucket_attrs(self.store.as_ref(), bucket).await?;
                build_download_response(fetch_latest(self.store.as_ref(), bucket, file).await?)
            }
            Operation::Edit => {
                let (bucket, file) = required_target(bucket.as_deref(), params.file.as_deref())?;
                self.edit(bucket, file).await
            }
            Operation::Save => {
                if parts.method != Method::POST {
                    return Err(EditorError::MethodNotAllowed(parts.method.to_string()));
                }
                let (bucket, file) = required_target(bucket.as_deref(), params.file.as_deref())?;
                let content = params.content.unwrap_or_default();
                browser::bucket_attrs(self.store.as_ref(), bucket).await?;
                writer::save(self.store.as_ref(), bucket, file, &content).await?;
                redirect_see_other(&editor_url(
                    &self.config.base_path,
                    &[(PARAM_OPERATION, "l"), (PARAM_BUCKET, bucket)],
                ))
            }
        }
    }

    /// Bucket selector plus, when a bucket is chosen, its objects.
    async fn listing(&self, bucket: Option<&str>) -> Result<Response<Full<Bytes>>, EditorError> {
        let show_bucket_selector = self.config.fixed_bucket.is_none();
        let buckets = if show_bucket_selector {
            browser::list_buckets(self.store.as_ref(), &self.config, bucket).await?
        } else {
            Vec::new()
        };

        let mut page = ListingTemplate {
            base_path: self.config.base_path.clone(),
            show_bucket_selector,
            buckets,
            bucket: None,
            objects: Vec::new(),
            error: None,
            edit_action: String::new(),
            download_action: String::new(),
        };
        let Some(bucket) = bucket else {
            return build_html_response(page);
        };

        match self.bucket_objects(bucket).await {
            Ok(objects) => {
                page.edit_action = editor_url(
                    &self.config.base_path,
                    &[(PARAM_OPERATION, "e"), (PARAM_BUCKET, bucket)],
                );
                page.download_action = editor_url(
                    &self.config.base_path,
                    &[(PARAM_OPERATION, "d"), (PARAM_BUCKET, bucket)],
                );
                page.bucket = Some(bucket.to_string());
                page.objects = objects;
                build_html_response(page)
            }
            // the selector is already on the page, keep it and show the failure under it
            Err(err) if show_bucket_selector => {
                warn!(error = %err, "Bucket listing failed");
                page.error = Some(err.to_string());
                build_html_response(page)
            }
            Err(err) => Err(err),
        }
    }

    async fn bucket_objects(&self, bucket: &str) -> Result<Vec<ObjectEntry>, EditorError> {
        browser::bucket_attrs(self.store.as_ref(), bucket).await?;
        browser::list_objects(self.store.as_ref(), bucket).await
    }

    async fn edit(&self, bucket: &str, file: &str) -> Result<Response<Full<Bytes>>, EditorError> {
        browser::bucket_attrs(self.store.as_ref(), bucket).await?;
        let object = fetch_latest(self.store.as_ref(), bucket, file).await?;
        build_html_response(EditTemplate {
            bucket: bucket.to_string(),
            name: file.to_string(),
            content: String::from_utf8_lossy(&object.content).into_owned(),
            save_action: editor_url(
                &self.config.base_path,
                &[(PARAM_OPERATION, "s"), (PARAM_BUCKET, bucket), (PARAM_FILE, file)],
            ),
            cancel_action: editor_url(&self.config.base_path, &[(PARAM_BUCKET, bucket)]),
        })
    }
}

fn required_target<'a>(
    bucket: Option<&'a str>,
    file: Option<&'a str>,
) -> Result<(&'a str, &'a str), EditorError> {
    let bucket = bucket.ok_or_else(|| {
        EditorError::BadRequest(format!("Missing bucket parameter '{PARAM_BUCKET}'"))
    })?;
    let file = file.filter(|file| !file.is_empty()).ok_or_else(|| {
        EditorError::BadRequest(format!("Missing object parameter '{PARAM_FILE}'"))
    })?;
    Ok((bucket, file))
}

async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, EditorError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(EditorError::PayloadTooLarge(limit))
        }
        Err(err) => Err(EditorError::BadRequest(format!(
            "Failed to read request body: {err}"
        ))),
    }
}
