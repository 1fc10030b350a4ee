//! Credential provider seam
//!
//! The subsystem never stores credentials. Callers inject a provider and
//! the transport attaches whatever it returns to the open request.

/// Supplies the bearer credential for the assistant backend.
pub trait CredentialProvider: Send + Sync {
    /// Current credential, or `None` to send the request unauthenticated.
    fn token(&self) -> Option<String>;
}

/// Fixed credential.
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialProvider for StaticCredential {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// No credential; requests carry no Authorization header.
pub struct Anonymous;

impl CredentialProvider for Anonymous {
    fn token(&self) -> Option<String> {
        None
    }
}
