//! Auth Gate: HTTP Basic authentication against the Credential Store.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use secret_string::SecretString;
use tracing::debug;

use crate::credentials::CredentialStore;
use crate::error::EditorError;
use crate::sniff::TEXT_PLAIN_UTF_8;

/// Login and password taken from an `Authorization: Basic` header.
#[derive(Debug)]
pub struct BasicCredentials {
    pub login: String,
    pub password: SecretString<String>,
}

/// Parse an `Authorization: Basic` header. Returns `None` when the header is
/// absent or malformed in any way.
pub fn parse_basic_auth(headers: &HeaderMap) -> Option<BasicCredentials> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some(BasicCredentials {
        login: login.to_string(),
        password: SecretString::new(password.to_string()),
    })
}

pub struct AuthGate {
    credentials: Arc<CredentialStore>,
}

impl AuthGate {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self { credentials }
    }

    /// Returns the authenticated login, or `None` when authentication is
    /// disabled because no credentials are configured.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<Option<String>, EditorError> {
        if self.credentials.is_empty() {
            return Ok(None);
        }
        let Some(basic) = parse_basic_auth(headers) else {
            debug!("Missing or malformed Authorization header");
            return Err(EditorError::AuthenticationFailure);
        };
        if !self.credentials.verify(&basic.login, basic.password.value()) {
            debug!(user = %basic.login, "Credentials rejected");
            return Err(EditorError::AuthenticationFailure);
        }
        Ok(Some(basic.login))
    }
}

/// The single response shape for every authentication failure.
pub fn unauthorized_response(realm: &str) -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::from_static(b"Unauthorized\n")));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    let challenge = HeaderValue::from_str(&format!("Basic realm=\"{realm}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
    res.headers_mut().insert(WWW_AUTHENTICATE, challenge);
    res.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static(TEXT_PLAIN_UTF_8),
    );
    res
}
