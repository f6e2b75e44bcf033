//! HTML rendering and response helpers.

use askama::Template;
use http::header::{
    CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, REFERRER_POLICY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use http::{HeaderValue, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;

use crate::editor::FetchedObject;
use crate::error::EditorError;
use crate::sniff::{OCTET_STREAM, TEXT_HTML_UTF_8};

/// Request parameter parsing
pub(crate) mod form;
/// Web templates
pub(crate) mod templates;

/// Build an editor URL under `base_path`, query values are percent-encoded.
pub(crate) fn editor_url(base_path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base_path.to_string();
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{base_path}?{query}")
}

/// Helper: Build HTML response with security headers
pub(crate) fn build_html_response(
    html: impl Template,
) -> Result<Response<Full<Bytes>>, EditorError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, TEXT_HTML_UTF_8)
        .header(CACHE_CONTROL, "no-store")
        .header(X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(X_FRAME_OPTIONS, "DENY")
        .header(REFERRER_POLICY, "strict-origin-when-cross-origin")
        .body(Full::new(Bytes::from(html.render()?)))
        .map_err(EditorError::from)
}

/// The raw bytes of an object with its stored content type, unescaped.
pub(crate) fn build_download_response(
    object: FetchedObject,
) -> Result<Response<Full<Bytes>>, EditorError> {
    let content_type = HeaderValue::from_str(&object.attrs.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM));
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, object.content.len())
        .header(CACHE_CONTROL, "no-store")
        .header(X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(Full::new(Bytes::from(object.content)))
        .map_err(EditorError::from)
}

/// 303 so the browser follows up with a GET.
pub(crate) fn redirect_see_other(location: &str) -> Result<Response<Full<Bytes>>, EditorError> {
    let mut res = Response::new(Full::new(Bytes::new()));
    res.headers_mut()
        .insert(LOCATION, HeaderValue::from_str(location)?);
    *res.status_mut() = StatusCode::SEE_OTHER;
    Ok(res)
}

/// Return with a 404 Not Found response
pub(crate) fn respond_404() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from("Not Found")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
