//! Username to secret lookup.
//!
//! The store is parsed once from `username:secret` lines and then only
//! read. Callers own loading the text; this module never touches the
//! filesystem.

use std::fmt;

/// Trait for resolving a username to its stored secret.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` for concurrent sessions.
pub trait CredentialLookup: Send + Sync {
    /// Return the secret for `username`, or `None` if unknown.
    fn find(&self, username: &str) -> Option<&str>;
}

/// A single `(username, secret)` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    secret: String,
}

impl Credential {
    /// Create a credential.
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// The username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The stored secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"[redacted]")
            .finish()
    }
}

/// In-memory credential set.
///
/// Lookup is a linear scan in file order, so the first entry wins when
/// the store lists a username twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialStore {
    entries: Vec<Credential>,
    skipped: usize,
}

impl CredentialStore {
    /// Parse store text.
    ///
    /// - Blank lines and lines starting with `#` or `;` are ignored
    /// - Each other line is split on its first `:`
    /// - Both fields are trimmed
    /// - Lines without `:` or with an empty username are skipped and counted
    pub fn parse(contents: &str) -> Self {
        let mut store = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            match line.split_once(':') {
                Some((username, secret)) if !username.trim().is_empty() => {
                    store
                        .entries
                        .push(Credential::new(username.trim(), secret.trim()));
                }
                _ => store.skipped += 1,
            }
        }

        store
    }

    /// Build a store from already separated credentials.
    pub fn from_credentials(entries: impl IntoIterator<Item = Credential>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            skipped: 0,
        }
    }

    /// Number of credentials held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no credentials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of malformed lines skipped while parsing.
    #[must_use]
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }
}

impl CredentialLookup for CredentialStore {
    fn find(&self, username: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|c| c.username == username)
            .map(|c| c.secret.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let store = CredentialStore::parse("alice:secret123\nbob:hunter2\n");
        assert_eq!(store.len(), 2);
        assert_eq!(store.find("alice"), Some("secret123"));
        assert_eq!(store.find("bob"), Some("hunter2"));
        assert_eq!(store.find("carol"), None);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let text = "# users\n\n; legacy comment\n   \nalice:pw\n";
        let store = CredentialStore::parse(text);
        assert_eq!(store.len(), 1);
        assert_eq!(store.skipped_lines(), 0);
        assert_eq!(store.find("# users"), None);
    }

    #[test]
    fn test_fields_are_trimmed() {
        let store = CredentialStore::parse("  alice  :  secret123 \r\n");
        assert_eq!(store.find("alice"), Some("secret123"));
    }

    #[test]
    fn test_splits_on_first_colon() {
        let store = CredentialStore::parse("alice:se:cret\n");
        assert_eq!(store.find("alice"), Some("se:cret"));
    }

    #[test]
    fn test_first_match_wins() {
        let store = CredentialStore::parse("alice:first\nalice:second\n");
        assert_eq!(store.find("alice"), Some("first"));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let store = CredentialStore::parse("no-colon-here\n:orphan\nalice:pw\n");
        assert_eq!(store.len(), 1);
        assert_eq!(store.skipped_lines(), 2);
    }

    #[test]
    fn test_empty_store_finds_nothing() {
        let store = CredentialStore::default();
        assert!(store.is_empty());
        assert_eq!(store.find("alice"), None);
        assert_eq!(store.find(""), None);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let store = CredentialStore::parse("Alice:pw\n");
        assert_eq!(store.find("alice"), None);
        assert_eq!(store.find("Alice"), Some("pw"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cred = Credential::new("alice", "topsecret");
        let debug = format!("{:?}", cred);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("topsecret"));
    }
}
