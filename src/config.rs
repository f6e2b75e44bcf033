//! Immutable per-process editor settings.

use std::time::Duration;

use crate::cli::Cli;
use crate::error::EditorError;

#[derive(Debug, Clone)]
pub struct EditorConfig {
    pub project: String,
    /// When set, every request operates on this bucket.
    pub fixed_bucket: Option<String>,
    /// Always starts and ends with `/`.
    pub base_path: String,
    pub realm: String,
    pub request_timeout: Duration,
    pub max_form_size: usize,
}

impl EditorConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, EditorError> {
        if cli.request_timeout == 0 {
            return Err(EditorError::Configuration(
                "request timeout must be at least one second".to_string(),
            ));
        }
        if cli.realm.contains('"') {
            return Err(EditorError::Configuration(
                "realm must not contain quotes".to_string(),
            ));
        }
        Ok(Self {
            project: cli.project.clone(),
            fixed_bucket: cli.bucket.clone().filter(|bucket| !bucket.is_empty()),
            base_path: normalize_base_path(&cli.base_path),
            realm: cli.realm.clone(),
            request_timeout: Duration::from_secs(cli.request_timeout),
            max_form_size: cli.max_form_size,
        })
    }

    /// The bucket a request operates on: the pinned one, else whatever the caller asked for.
    pub fn resolve_bucket(&self, requested: Option<String>) -> Option<String> {
        match &self.fixed_bucket {
            Some(bucket) => Some(bucket.clone()),
            None => requested.filter(|bucket| !bucket.is_empty()),
        }
    }
}

fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_base_path_normalization() {
        assert_eq!(normalize_base_path(""), "/");
        assert_eq!(normalize_base_path("/"), "/");
        assert_eq!(normalize_base_path("edit"), "/edit/");
        assert_eq!(normalize_base_path("/edit/"), "/edit/");
        assert_eq!(normalize_base_path("/a/b"), "/a/b/");
    }

    #[test]
    fn test_pinned_bucket_overrides_request() {
        let config =
            EditorConfig::from_cli(&Cli::parse_from(["bucketedit", "--bucket", "demo"]))
                .expect("config");
        assert_eq!(
            config.resolve_bucket(Some("other".to_string())),
            Some("demo".to_string())
        );
        assert_eq!(config.resolve_bucket(None), Some("demo".to_string()));
    }

    #[test]
    fn test_unpinned_bucket_passthrough() {
        let config = EditorConfig::from_cli(&Cli::parse_from(["bucketedit"])).expect("config");
        assert_eq!(
            config.resolve_bucket(Some("other".to_string())),
            Some("other".to_string())
        );
        assert_eq!(config.resolve_bucket(Some(String::new())), None);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(
            EditorConfig::from_cli(&Cli::parse_from(["bucketedit", "--request-timeout", "0"]))
                .is_err()
        );
    }
}
