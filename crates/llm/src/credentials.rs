//! Credential Retrieval
//!
//! Connectors look credentials up at call time through an injected
//! [`CredentialSource`]; a missing credential surfaces as an
//! `Authentication` error only when a request needs it.

use std::collections::HashMap;

/// Service name under which Prompt Studio stores its credentials.
pub const CREDENTIAL_SERVICE: &str = "prompt-studio";

/// Account holding the hosted backend's API key.
pub const OPENAI_ACCOUNT: &str = "openai_api_key";

/// Read access to stored secrets.
pub trait CredentialSource: Send + Sync {
    fn get_credential(&self, service: &str, account: &str) -> Option<String>;
}

/// A source with nothing in it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn get_credential(&self, _service: &str, _account: &str) -> Option<String> {
        None
    }
}

/// Fixed in-memory credentials.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    entries: HashMap<(String, String), String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        service: impl Into<String>,
        account: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.entries
            .insert((service.into(), account.into()), secret.into());
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn get_credential(&self, service: &str, account: &str) -> Option<String> {
        self.entries
            .get(&(service.to_string(), account.to_string()))
            .cloned()
    }
}
