//! A string wrapper for credential material: it prints as asterisks and only
//! compares against other values in constant time.
//!
//! It WILL serialize the value when the `serde` feature is enabled, so stored
//! digests can be loaded from configuration files.
//!
//! # Examples
//! ```
//! use secret_string::SecretString;
//! let secret = SecretString::new("hunter2");
//! assert_eq!(format!("{}", secret), "*******");
//! assert_eq!(format!("{:?}", secret), "SecretString(*******)");
//! assert!(secret.ct_eq("hunter2"));
//! assert!(!secret.ct_eq("hunter3"));
//! ```

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

use std::fmt::Debug;

/// Compare two byte slices without short-circuiting on the first difference.
///
/// Slices of different length compare unequal immediately, so callers that
/// need to hide length should compare fixed-size digests.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// A string holding secret material, hidden from `Display` and `Debug`.
#[derive(Clone, Eq)]
pub struct SecretString<T = String>(T)
where
    T: AsRef<str>;

impl<T: AsRef<str>> SecretString<T> {
    pub fn new(s: T) -> Self {
        SecretString(s)
    }

    /// Returns the underlying value.
    pub fn value(&self) -> &str {
        self.0.as_ref()
    }

    pub fn len(&self) -> usize {
        self.0.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Constant-time equality against a candidate value.
    pub fn ct_eq(&self, candidate: &str) -> bool {
        constant_time_eq(self.value().as_bytes(), candidate.as_bytes())
    }

    /// Returns a string of asterisks (*) with the same length as the secret.
    pub fn as_stars(&self) -> String {
        "*".repeat(self.len())
    }
}

/// Equality between two secrets also goes through the constant-time path.
impl<T: AsRef<str>> PartialEq for SecretString<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other.value())
    }
}

impl<T: AsRef<str>> From<T> for SecretString<T> {
    fn from(s: T) -> Self {
        SecretString(s)
    }
}

impl<T: AsRef<str>> std::fmt::Display for SecretString<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_stars())
    }
}

impl<T: AsRef<str>> Debug for SecretString<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretString({})", self.as_stars())
    }
}

#[cfg(feature = "serde")]
impl<T: AsRef<str> + serde::Serialize> serde::Serialize for SecretString<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.value())
    }
}

#[cfg(feature = "serde")]
impl<'de, T: AsRef<str> + serde::Deserialize<'de>> serde::Deserialize<'de> for SecretString<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self::new(serde::Deserialize::deserialize(deserializer)?))
    }
}
