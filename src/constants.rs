use std::time::Duration;

/// Form/query parameter selecting the operation.
pub(crate) const PARAM_OPERATION: &str = "o";
/// Form/query parameter carrying the bucket name.
pub(crate) const PARAM_BUCKET: &str = "b";
/// Form/query parameter carrying the object name.
pub(crate) const PARAM_FILE: &str = "f";
/// Form field carrying the edited object content.
pub(crate) const PARAM_CONTENT: &str = "c";
/// Submit button name of the cancel affordance on the edit page.
pub(crate) const PARAM_CANCEL: &str = "cancel";

pub const DEFAULT_REALM: &str = "bucketedit";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest request body accepted for any operation, 10 MiB.
pub const DEFAULT_MAX_FORM_SIZE: usize = 10 << 20;

/// Length of a hex encoded SHA-256 digest.
pub(crate) const SHA256_HEX_LENGTH: usize = 64;

/// Directory under the filesystem backend root that holds object sidecars.
pub(crate) const SIDECAR_DIR: &str = ".bucketedit";

pub(crate) const HEALTHCHECK_PATH: &str = "/up";

pub(crate) const TRACE_OPERATION: &str = "operation";
pub(crate) const TRACE_BUCKET: &str = "bucket";
pub(crate) const TRACE_KEY: &str = "key";
pub(crate) const TRACE_USER: &str = "user";
pub(crate) const TRACE_STATUS_CODE: &str = "status_code";

#[cfg(test)]
pub(crate) const TEST_BUCKET: &str = "demo";
#[cfg(test)]
pub(crate) const TEST_OTHER_BUCKET: &str = "other";
#[cfg(test)]
pub(crate) const TEST_OBJECT: &str = "notes.txt";
#[cfg(test)]
pub(crate) const TEST_USER: &str = "admin";
#[cfg(test)]
pub(crate) const TEST_PASSWORD: &str = "hunter2";
