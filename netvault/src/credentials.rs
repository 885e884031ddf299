//! Run-scoped credential material.
//!
//! Credentials are grouped in named security domains (for example one for
//! general device access and one for an admin-gated appliance class). Devices
//! reference a domain by name; the secret itself is only exposed at the
//! moment a connection authenticates.

use std::fmt;

use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};

/// Username and secret for one security domain.
pub struct Credential {
    /// Login name.
    pub username: String,

    /// Password, never logged.
    pub secret: SecretString,
}

impl Credential {
    /// Create a credential.
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Whether the secret is empty.
    pub fn is_blank(&self) -> bool {
        self.secret.expose_secret().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Opaque handle to a credential domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialRef(String);

impl CredentialRef {
    /// Reference a domain by name.
    pub fn new(domain: impl Into<String>) -> Self {
        Self(domain.into())
    }

    /// The domain name.
    pub fn domain(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The credentials supplied for one run.
///
/// Dropping or clearing the set releases the secrets; `secrecy` zeroizes
/// them on drop.
#[derive(Debug, Default)]
pub struct CredentialSet {
    domains: IndexMap<String, Credential>,
}

impl CredentialSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential for a domain.
    pub fn with(mut self, domain: impl Into<String>, credential: Credential) -> Self {
        self.insert(domain, credential);
        self
    }

    /// Insert or replace the credential for a domain.
    pub fn insert(&mut self, domain: impl Into<String>, credential: Credential) {
        self.domains.insert(domain.into(), credential);
    }

    /// Resolve a handle.
    pub fn resolve(&self, handle: &CredentialRef) -> Option<&Credential> {
        self.domains.get(handle.domain())
    }

    /// Remove a domain from the set and hand its credential over.
    pub fn take(&mut self, handle: &CredentialRef) -> Option<Credential> {
        self.domains.shift_remove(handle.domain())
    }

    /// Domain names, in insertion order.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    /// Whether no credentials are held.
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Drop every held secret.
    pub fn clear(&mut self) {
        self.domains.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let cred = Credential::new("admin", "hunter2");
        let rendered = format!("{:?}", cred);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_resolve_and_clear() {
        let mut set = CredentialSet::new()
            .with("default", Credential::new("netops", "pw"))
            .with("appliance", Credential::new("admin", ""));

        let handle = CredentialRef::new("appliance");
        assert!(set.resolve(&handle).unwrap().is_blank());
        assert!(set.resolve(&CredentialRef::new("missing")).is_none());

        let backup = set.take(&CredentialRef::new("default")).unwrap();
        assert_eq!(backup.username, "netops");
        assert_eq!(set.domains().collect::<Vec<_>>(), vec!["appliance"]);

        set.clear();
        assert!(set.is_empty());
        assert!(set.resolve(&handle).is_none());
    }
}
