//! Centralized error type for the editor.
//!
//! Every failure is recovered at the request boundary and rendered as
//! `Error: <context> - <detail>`.

use std::fmt;
use std::time::Duration;

use http::header::{CONTENT_TYPE, InvalidHeaderValue};
use http::{HeaderValue, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;

use crate::sniff::TEXT_PLAIN_UTF_8;
use crate::store::StoreError;

#[derive(Debug)]
pub enum EditorError {
    AuthenticationFailure,
    BadRequest(String),
    Configuration(String),
    /// The store client could not be constructed.
    StoreUnavailable(String),
    /// Enumerating buckets or objects failed part way.
    ListFailure {
        context: &'static str,
        source: StoreError,
    },
    /// Bucket or object metadata could not be fetched.
    AttributeFetch {
        context: &'static str,
        source: StoreError,
    },
    /// The generation-pinned read could not be opened.
    OpenFailure {
        context: &'static str,
        source: StoreError,
    },
    /// The opened content could not be drained.
    ReadFailure {
        context: &'static str,
        source: StoreError,
    },
    WriteFailure {
        context: &'static str,
        source: StoreError,
    },
    FinalizeFailure {
        context: &'static str,
        source: StoreError,
    },
    LengthMismatch {
        submitted: usize,
        persisted: usize,
    },
    DigestMismatch {
        submitted: String,
        persisted: String,
    },
    EmptySubmission,
    MethodNotAllowed(String),
    PayloadTooLarge(usize),
    Timeout(Duration),
    HttpResponse(String),
    Hyper(String),
    TemplateRendering(String),
    Io(std::io::Error),
}

impl EditorError {
    /// Short label naming the step that failed.
    pub fn context(&self) -> &str {
        match self {
            EditorError::AuthenticationFailure => "Authenticating",
            EditorError::BadRequest(_) => "Parsing request",
            EditorError::Configuration(_) => "Configuration",
            EditorError::StoreUnavailable(_) => "Opening storage client",
            EditorError::ListFailure { context, .. }
            | EditorError::AttributeFetch { context, .. }
            | EditorError::OpenFailure { context, .. }
            | EditorError::ReadFailure { context, .. }
            | EditorError::WriteFailure { context, .. }
            | EditorError::FinalizeFailure { context, .. } => *context,
            EditorError::LengthMismatch { .. } => "Verifying object length",
            EditorError::DigestMismatch { .. } => "Verifying object digest",
            EditorError::EmptySubmission => "Saving object",
            EditorError::MethodNotAllowed(_) => "Checking request method",
            EditorError::PayloadTooLarge(_) => "Reading request body",
            EditorError::Timeout(_) => "Handling request",
            EditorError::HttpResponse(_) => "Building response",
            EditorError::Hyper(_) => "HTTP transport",
            EditorError::TemplateRendering(_) => "Rendering page",
            EditorError::Io(_) => "IO",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EditorError::AuthenticationFailure => StatusCode::UNAUTHORIZED,
            EditorError::BadRequest(_) | EditorError::EmptySubmission => StatusCode::BAD_REQUEST,
            EditorError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            EditorError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            EditorError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EditorError::AttributeFetch { source, .. } | EditorError::OpenFailure { source, .. }
                if source.is_not_found() =>
            {
                StatusCode::NOT_FOUND
            }
            EditorError::StoreUnavailable(_)
            | EditorError::ListFailure { .. }
            | EditorError::AttributeFetch { .. }
            | EditorError::OpenFailure { .. }
            | EditorError::ReadFailure { .. }
            | EditorError::WriteFailure { .. }
            | EditorError::FinalizeFailure { .. } => StatusCode::BAD_GATEWAY,
            EditorError::LengthMismatch { .. }
            | EditorError::DigestMismatch { .. }
            | EditorError::Configuration(_)
            | EditorError::HttpResponse(_)
            | EditorError::Hyper(_)
            | EditorError::TemplateRendering(_)
            | EditorError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            EditorError::AuthenticationFailure => "Unauthorized".to_string(),
            EditorError::BadRequest(msg)
            | EditorError::Configuration(msg)
            | EditorError::StoreUnavailable(msg)
            | EditorError::HttpResponse(msg)
            | EditorError::Hyper(msg)
            | EditorError::TemplateRendering(msg) => msg.clone(),
            EditorError::ListFailure { source, .. }
            | EditorError::AttributeFetch { source, .. }
            | EditorError::OpenFailure { source, .. }
            | EditorError::ReadFailure { source, .. }
            | EditorError::WriteFailure { source, .. }
            | EditorError::FinalizeFailure { source, .. } => source.to_string(),
            EditorError::LengthMismatch {
                submitted,
                persisted,
            } => format!("form:{submitted} != bucket:{persisted}"),
            EditorError::DigestMismatch {
                submitted,
                persisted,
            } => format!("form:{submitted} != bucket:{persisted}"),
            EditorError::EmptySubmission => "Got 0 size content, refusing to write".to_string(),
            EditorError::MethodNotAllowed(method) => {
                format!("{method} is not allowed for this operation")
            }
            EditorError::PayloadTooLarge(limit) => {
                format!("Request body exceeds {limit} bytes")
            }
            EditorError::Timeout(limit) => {
                format!("Request did not complete within {}s", limit.as_secs_f32())
            }
            EditorError::Io(err) => err.to_string(),
        }
    }
}

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.context(), self.detail())
    }
}

impl std::error::Error for EditorError {}

impl From<std::io::Error> for EditorError {
    fn from(err: std::io::Error) -> Self {
        EditorError::Io(err)
    }
}

impl From<hyper::Error> for EditorError {
    fn from(err: hyper::Error) -> Self {
        EditorError::Hyper(err.to_string())
    }
}

impl From<http::Error> for EditorError {
    fn from(err: http::Error) -> Self {
        EditorError::HttpResponse(err.to_string())
    }
}

impl From<InvalidHeaderValue> for EditorError {
    fn from(err: InvalidHeaderValue) -> Self {
        EditorError::HttpResponse(err.to_string())
    }
}

impl From<askama::Error> for EditorError {
    fn from(err: askama::Error) -> Self {
        EditorError::TemplateRendering(err.to_string())
    }
}

impl From<multer::Error> for EditorError {
    fn from(err: multer::Error) -> Self {
        match err {
            multer::Error::StreamSizeExceeded { limit }
            | multer::Error::FieldSizeExceeded { limit, .. } => {
                EditorError::PayloadTooLarge(limit as usize)
            }
            other => EditorError::BadRequest(format!("Invalid multipart form: {other}")),
        }
    }
}

impl From<rustls::Error> for EditorError {
    fn from(err: rustls::Error) -> Self {
        EditorError::Configuration(format!("TLS: {err}"))
    }
}

impl From<EditorError> for Response<Full<Bytes>> {
    fn from(err: EditorError) -> Response<Full<Bytes>> {
        let mut res = Response::new(Full::new(Bytes::from(format!("Error: {err}\n"))));
        *res.status_mut() = err.status_code();
        res.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static(TEXT_PLAIN_UTF_8),
        );
        res
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        String::from_utf8(bytes.to_vec()).expect("Body is not valid UTF-8")
    }

    #[tokio::test]
    async fn test_error_response_format() {
        let response: Response<Full<Bytes>> = EditorError::AttributeFetch {
            context: "Getting object attributes",
            source: StoreError::Other("backend exploded".to_string()),
        }
        .into();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_string(response).await,
            "Error: Getting object attributes - backend exploded\n"
        );
    }

    #[tokio::test]
    async fn test_length_mismatch_body() {
        let response: Response<Full<Bytes>> = EditorError::LengthMismatch {
            submitted: 11,
            persisted: 5,
        }
        .into();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_string(response).await,
            "Error: Verifying object length - form:11 != bucket:5\n"
        );
    }

    #[test]
    fn test_missing_object_is_404() {
        let err = EditorError::AttributeFetch {
            context: "Getting object attributes",
            source: StoreError::NotFound("object 'demo/x'".to_string()),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(EditorError::EmptySubmission.status_code(), StatusCode::BAD_REQUEST);
    }
}
