//! Request parameter parsing.
//!
//! Parameters come from the query string and from the body, which may be
//! `application/x-www-form-urlencoded` or `multipart/form-data`. A value in
//! the body wins over the same name in the query.

use std::convert::Infallible;

use http::HeaderMap;
use http::header::CONTENT_TYPE;
use hyper::body::Bytes;
use mime_guess::mime;

use crate::constants::{PARAM_BUCKET, PARAM_CANCEL, PARAM_CONTENT, PARAM_FILE, PARAM_OPERATION};
use crate::error::EditorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// No or unknown `o`: bucket listing, or object listing when a bucket is known.
    Default,
    ListObjects,
    Download,
    Edit,
    Save,
}

impl Operation {
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("l") => Operation::ListObjects,
            Some("d") => Operation::Download,
            Some("e") => Operation::Edit,
            Some("s") => Operation::Save,
            _ => Operation::Default,
        }
    }
}

impl AsRef<str> for Operation {
    fn as_ref(&self) -> &str {
        match self {
            Operation::Default => "default",
            Operation::ListObjects => "list",
            Operation::Download => "download",
            Operation::Edit => "edit",
            Operation::Save => "save",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EditorParams {
    pub operation: Option<String>,
    pub bucket: Option<String>,
    pub file: Option<String>,
    /// Raw bytes of the submitted content, never re-encoded.
    pub content: Option<Bytes>,
    pub cancel: bool,
}

impl EditorParams {
    /// The requested operation. A submitted cancel button always means the listing.
    pub fn operation(&self) -> Operation {
        if self.cancel {
            return Operation::Default;
        }
        Operation::from_param(self.operation.as_deref())
    }

    fn set(&mut self, name: &str, value: Bytes) {
        fn text(value: &[u8]) -> Option<String> {
            Some(String::from_utf8_lossy(value).into_owned())
        }
        match name {
            PARAM_OPERATION => self.operation = text(&value),
            PARAM_BUCKET => self.bucket = text(&value),
            PARAM_FILE => self.file = text(&value),
            PARAM_CONTENT => self.content = Some(value),
            PARAM_CANCEL => self.cancel = true,
            _ => {}
        }
    }

    fn merge_urlencoded(&mut self, input: &[u8]) {
        for (name, value) in form_urlencoded::parse(input) {
            self.set(&name, Bytes::from(value.into_owned()));
        }
    }

    /// Parse the query string and the already collected body.
    pub async fn parse(
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Self, EditorError> {
        let mut params = EditorParams::default();
        if let Some(query) = query {
            params.merge_urlencoded(query.as_bytes());
        }
        if body.is_empty() {
            return Ok(params);
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let essence = content_type
            .parse::<mime::Mime>()
            .map(|parsed| parsed.essence_str().to_ascii_lowercase())
            .unwrap_or_default();

        if essence == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            params.merge_urlencoded(&body);
        } else if essence == mime::MULTIPART_FORM_DATA.essence_str() {
            let boundary = multer::parse_boundary(content_type)?;
            let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(body) });
            let mut multipart = multer::Multipart::new(stream, boundary);
            while let Some(field) = multipart.next_field().await? {
                let Some(name) = field.name().map(str::to_string) else {
                    continue;
                };
                let value = field.bytes().await?;
                params.set(&name, value);
            }
        }
        Ok(params)
    }
}
