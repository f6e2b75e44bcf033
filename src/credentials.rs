//! Credential Store: the principals allowed through the Auth Gate.
//!
//! Every `*.json` file in the credentials directory holds one principal:
//!
//! ```json
//! { "login": "admin", "salt": "pepper", "hash": "<hex sha256 of salt + password>" }
//! ```
//!
//! `salt` may be omitted, in which case the digest is of the password alone.

use std::fs;
use std::path::{Path, PathBuf};

use secret_string::{SecretString, constant_time_eq};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::constants::SHA256_HEX_LENGTH;
use crate::error::EditorError;

#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    pub login: String,
    #[serde(default)]
    pub salt: String,
    /// Lowercase hex SHA-256 of `salt + password`.
    pub hash: SecretString<String>,
}

impl Credential {
    /// Build a credential from a plaintext password, used by tests and tooling.
    pub fn from_password(login: &str, salt: &str, password: &str) -> Self {
        Self {
            login: login.to_string(),
            salt: salt.to_string(),
            hash: SecretString::new(salted_digest(salt, password)),
        }
    }

    fn is_valid_digest(&self) -> bool {
        self.hash.len() == SHA256_HEX_LENGTH
            && self.hash.value().chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl TryFrom<&PathBuf> for Credential {
    type Error = EditorError;

    fn try_from(path: &PathBuf) -> Result<Self, Self::Error> {
        let contents = fs::read_to_string(path)?;
        let mut credential: Credential = serde_json::from_str(&contents).map_err(|err| {
            EditorError::Configuration(format!("{}: {err}", path.display()))
        })?;
        credential.hash = SecretString::new(credential.hash.value().to_ascii_lowercase());
        Ok(credential)
    }
}

pub fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Default)]
pub struct CredentialStore {
    credentials: Vec<Credential>,
}

impl CredentialStore {
    /// Load every credential file in `credentials_dir`. A missing directory
    /// yields an empty store, unreadable or invalid files are skipped.
    pub fn new(credentials_dir: &Path) -> Result<Self, EditorError> {
        info!(credentials_dir = ?credentials_dir, "Loading credentials");

        if !credentials_dir.exists() {
            warn!(credentials_dir = ?credentials_dir, "Credentials directory does not exist, starting with no credentials");
            return Ok(Self::default());
        }

        if !credentials_dir.is_dir() {
            error!(credentials_dir = ?credentials_dir, "Credentials path is not a directory");
            return Err(EditorError::Configuration(format!(
                "{} is not a directory",
                credentials_dir.display()
            )));
        }

        let mut paths = fs::read_dir(credentials_dir)?
            .filter_map(|entry| {
                entry
                    .inspect_err(|err| debug!(error = %err, "Failed to read directory entry"))
                    .ok()
            })
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json")
            })
            .collect::<Vec<_>>();
        paths.sort();

        let mut credentials = Vec::with_capacity(paths.len());
        for path in paths {
            let credential = match Credential::try_from(&path) {
                Ok(credential) => credential,
                Err(err) => {
                    error!(path = ?path, error = %err, "Failed to load credential, ignoring");
                    continue;
                }
            };
            if !credential.is_valid_digest() {
                error!(login = %credential.login, path = ?path, "Digest is not a hex encoded SHA-256, ignoring!");
                continue;
            }
            debug!(login = %credential.login, path = ?path, "Loaded credential");
            credentials.push(credential);
        }

        info!(loaded_credentials_count = credentials.len());
        Ok(Self { credentials })
    }

    pub fn from_credentials(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    /// Check a login/password pair against every stored principal.
    ///
    /// Logins are compared as SHA-256 digests so the comparison is fixed
    /// length, and every credential is checked even after a match.
    pub fn verify(&self, login: &str, password: &str) -> bool {
        let login_digest = Sha256::digest(login.as_bytes());
        let mut matched = false;
        for credential in &self.credentials {
            let stored_login = Sha256::digest(credential.login.as_bytes());
            let login_ok = constant_time_eq(&stored_login, &login_digest);
            let hash_ok = credential
                .hash
                .ct_eq(&salted_digest(&credential.salt, password));
            matched |= login_ok & hash_ok;
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;
    use crate::constants::{TEST_PASSWORD, TEST_USER};

    #[test]
    fn test_salted_digest() {
        assert_eq!(
            salted_digest("pepper", "hunter2"),
            "ca458f67a1e64e60f40414c062c57abbfc1d41b5d0c30cd07d12704540067f21"
        );
    }

    #[test]
    fn test_verify() {
        let store = CredentialStore::from_credentials(vec![
            Credential::from_password("other", "x", "secret"),
            Credential::from_password(TEST_USER, "pepper", TEST_PASSWORD),
        ]);
        assert!(store.verify(TEST_USER, TEST_PASSWORD));
        assert!(!store.verify(TEST_USER, "hunter3"));
        assert!(!store.verify("root", TEST_PASSWORD));
        assert!(!store.verify("other", TEST_PASSWORD));
        assert!(store.verify("other", "secret"));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let write = |name: &str, contents: &str| {
            let mut file =
                fs::File::create(dir.path().join(name)).expect("Failed to create credential");
            file.write_all(contents.as_bytes())
                .expect("Failed to write credential");
        };
        write(
            "admin.json",
            r#"{"login": "admin", "salt": "pepper", "hash": "CA458F67A1E64E60F40414C062C57ABBFC1D41B5D0C30CD07D12704540067F21"}"#,
        );
        write("short.json", r#"{"login": "short", "hash": "abc123"}"#);
        write("broken.json", "{ not json");
        write("ignored.txt", "not a credential");

        let store = CredentialStore::new(dir.path()).expect("Failed to load credentials");
        assert_eq!(store.credential_count(), 1);
        assert!(store.verify(TEST_USER, TEST_PASSWORD));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store =
            CredentialStore::new(&dir.path().join("nope")).expect("Missing dir should be ok");
        assert!(store.is_empty());
    }

    #[test]
    fn test_debug_hides_digest() {
        let credential = Credential::from_password(TEST_USER, "pepper", TEST_PASSWORD);
        assert!(!format!("{credential:?}").contains("ca458f67"));
    }
}
