use std::num::NonZeroU16;
use std::path::PathBuf;

use clap::Parser;

use crate::constants::{DEFAULT_MAX_FORM_SIZE, DEFAULT_REALM, DEFAULT_REQUEST_TIMEOUT};
use crate::store::Backend;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Browse and edit objects in a bucket store from a web browser")]
pub struct Cli {
    #[clap(short, long, default_value = "8090", env = "BUCKETEDIT_PORT")]
    pub port: NonZeroU16,

    #[clap(long, default_value = "127.0.0.1", env = "BUCKETEDIT_HOST")]
    pub host: String,

    #[clap(long, value_enum, default_value = "filesystem", env = "BUCKETEDIT_BACKEND")]
    pub backend: Backend,

    /// Where the filesystem backend keeps its buckets
    #[clap(short, long, default_value = "./data", env = "BUCKETEDIT_ROOT_DIR")]
    pub root_dir: PathBuf,

    /// Project scope used when enumerating buckets
    #[clap(long, default_value = "", env = "BUCKETEDIT_PROJECT")]
    pub project: String,

    /// Restrict the editor to a single bucket, ignoring the one in the request
    #[clap(short, long, env = "BUCKETEDIT_BUCKET")]
    pub bucket: Option<String>,

    /// Path the editor is served on
    #[clap(long, default_value = "/", env = "BUCKETEDIT_BASE_PATH")]
    pub base_path: String,

    #[clap(
        short,
        long,
        default_value = "./credentials",
        env = "BUCKETEDIT_CREDENTIALS_DIR"
    )]
    pub credentials_dir: PathBuf,

    /// Allow starting without any credentials, which lets every request through
    #[clap(long, env = "BUCKETEDIT_DISABLE_AUTH")]
    pub disable_auth: bool,

    #[clap(long, default_value = DEFAULT_REALM, env = "BUCKETEDIT_REALM")]
    pub realm: String,

    /// Deadline for a whole request, in seconds
    #[clap(
        long,
        default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs(),
        env = "BUCKETEDIT_REQUEST_TIMEOUT"
    )]
    pub request_timeout: u64,

    /// Largest accepted request body, in bytes
    #[clap(long, default_value_t = DEFAULT_MAX_FORM_SIZE, env = "BUCKETEDIT_MAX_FORM_SIZE")]
    pub max_form_size: usize,

    #[clap(long, env = "BUCKETEDIT_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    #[clap(long, env = "BUCKETEDIT_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["bucketedit"]);
        assert_eq!(cli.port.get(), 8090);
        assert_eq!(cli.backend, Backend::Filesystem);
        assert_eq!(cli.base_path, "/");
        assert_eq!(cli.request_timeout, 30);
        assert_eq!(cli.max_form_size, 10 << 20);
        assert!(cli.bucket.is_none());
        assert!(!cli.disable_auth);
    }

    #[test]
    fn test_memory_backend_with_pinned_bucket() {
        let cli = Cli::parse_from(["bucketedit", "--backend", "memory", "--bucket", "demo"]);
        assert_eq!(cli.backend, Backend::Memory);
        assert_eq!(cli.bucket.as_deref(), Some("demo"));
    }
}
