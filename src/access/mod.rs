//! Tiered read/write permission rules for config keys.
//!
//! A file is either private (every key needs proof) or public (only keys
//! starting with `_` need proof). Proof is either the process root password
//! or the file's stored access token.
//!
//! Known weak default: while the process root password is unset (`""`), a
//! caller presenting an empty root password passes the root check, so an
//! uninitialized process is effectively unauthenticated. Set a root password
//! through [`crate::Registry::set_root_pass`] before exposing a store.

use std::fmt;

use serde::Deserialize;

/// Secrets a caller presents with a request.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Candidate per-file access token.
    #[serde(default)]
    pub access_token: String,
    /// Candidate process root password.
    #[serde(default)]
    pub root_pass: String,
}

impl Credentials {
    /// No proof at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Proof by access token only.
    pub fn token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            root_pass: String::new(),
        }
    }

    /// Proof by root password only.
    pub fn root(root_pass: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            root_pass: root_pass.into(),
        }
    }

    /// Proof by both.
    pub fn new(access_token: impl Into<String>, root_pass: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            root_pass: root_pass.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "<empty>" } else { "<redacted>" };

        f.debug_struct("Credentials")
            .field("access_token", &redact(&self.access_token))
            .field("root_pass", &redact(&self.root_pass))
            .finish()
    }
}

/// Everything the permission decision depends on, captured at call time.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Key being read or written.
    pub key: &'a str,
    /// What the caller presented.
    pub credentials: &'a Credentials,
    /// The file's cached privacy flag.
    pub file_private: bool,
    /// The file's stored access token, if it holds a string one.
    pub stored_token: Option<&'a str>,
    /// The current process root password.
    pub root_password: &'a str,
}

/// Keys starting with `_` are private even in a public file.
pub fn is_private_key(key: &str) -> bool {
    key.starts_with('_')
}

/// Compares a presented root password with the process one.
///
/// `"" == ""` passes: this is the documented weak default.
pub fn root_matches(root_password: &str, presented: &str) -> bool {
    root_password == presented
}

/// Verifies an access token, gated on proof of the root password.
///
/// Returns `None` when `presented_root` is wrong or the file stores no
/// token, `Some(false)` when the stored token is empty (token access
/// disabled) or differs, and `Some(true)` on a match.
pub fn check_access_token(
    stored_token: Option<&str>,
    token: &str,
    root_password: &str,
    presented_root: &str,
) -> Option<bool> {
    if !root_matches(root_password, presented_root) {
        return None;
    }

    let stored = stored_token?;
    Some(!stored.is_empty() && stored == token)
}

/// Whether the credentials prove root or token ownership of the file.
///
/// The token path presents the process root password to
/// [`check_access_token`] itself, so a matching token alone is enough.
pub fn has_proof(
    credentials: &Credentials,
    stored_token: Option<&str>,
    root_password: &str,
) -> bool {
    root_matches(root_password, &credentials.root_pass)
        || check_access_token(
            stored_token,
            &credentials.access_token,
            root_password,
            root_password,
        ) == Some(true)
}

/// Decides whether the request may read or write its key. Never fails.
pub fn is_allowed(request: &AccessRequest<'_>) -> bool {
    if request.file_private || is_private_key(request.key) {
        has_proof(
            request.credentials,
            request.stored_token,
            request.root_password,
        )
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(
        key: &'a str,
        credentials: &'a Credentials,
        file_private: bool,
        root_password: &'a str,
    ) -> AccessRequest<'a> {
        AccessRequest {
            key,
            credentials,
            file_private,
            stored_token: Some("token-1"),
            root_password,
        }
    }

    #[test]
    fn public_file_allows_plain_keys_without_proof() {
        let none = Credentials::none();
        assert!(is_allowed(&request("port", &none, false, "root")));
    }

    #[test]
    fn public_file_guards_underscore_keys() {
        let none = Credentials::none();
        let root = Credentials::root("root");
        let token = Credentials::token("token-1");
        let wrong = Credentials::new("nope", "nope");

        assert!(!is_allowed(&request("_secret", &none, false, "root")));
        assert!(is_allowed(&request("_secret", &root, false, "root")));
        assert!(is_allowed(&request("_secret", &token, false, "root")));
        assert!(!is_allowed(&request("_secret", &wrong, false, "root")));
    }

    #[test]
    fn private_file_guards_every_key() {
        let none = Credentials::none();
        let token = Credentials::token("token-1");

        assert!(!is_allowed(&request("port", &none, true, "root")));
        assert!(is_allowed(&request("port", &token, true, "root")));
    }

    #[test]
    fn unset_root_password_is_the_weak_default() {
        let none = Credentials::none();
        assert!(is_allowed(&request("_secret", &none, true, "")));
    }

    #[test]
    fn empty_stored_token_never_matches() {
        let none = Credentials::none();
        let req = AccessRequest {
            key: "_secret",
            credentials: &none,
            file_private: true,
            stored_token: Some(""),
            root_password: "root",
        };

        assert!(!is_allowed(&req));
    }

    #[test]
    fn token_check_requires_root_proof() {
        assert_eq!(check_access_token(Some("t"), "t", "root", "bad"), None);
        assert_eq!(check_access_token(Some("t"), "t", "root", "root"), Some(true));
        assert_eq!(check_access_token(Some("t"), "x", "root", "root"), Some(false));
        assert_eq!(check_access_token(None, "t", "root", "root"), None);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", Credentials::new("abc", "def"));
        assert!(!rendered.contains("abc"));
        assert!(!rendered.contains("def"));
    }
}
