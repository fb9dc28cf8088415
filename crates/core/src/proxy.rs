//! Proxy Configuration Types
//!
//! Data types for routing backend traffic through a proxy. The HTTP client
//! factory that consumes them lives in the `prompt-studio-llm` crate.

use serde::{Deserialize, Serialize};

/// Proxy protocol type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

impl ProxyProtocol {
    /// Return the URL scheme string for this protocol.
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks5 => "socks5",
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyConfig {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Held in memory only; persisted through the secret store.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Build the proxy URL string (without auth).
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }

    /// Build the proxy URL string with embedded credentials (if any).
    pub fn url_with_auth(&self) -> String {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                format!("{}://{}:{}@{}:{}", self.protocol.scheme(), u, p, self.host, self.port)
            }
            (Some(u), None) => {
                format!("{}://{}@{}:{}", self.protocol.scheme(), u, self.host, self.port)
            }
            _ => self.url(),
        }
    }
}

/// Per-backend proxy strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStrategy {
    /// Use the global proxy configuration, if one is set.
    #[default]
    UseGlobal,
    /// Connect directly.
    NoProxy,
    /// Use a backend-specific proxy configuration.
    Custom,
}

impl ProxyStrategy {
    /// Default strategy for a backend: local servers connect directly,
    /// everything else follows the global setting.
    pub fn default_for(backend_id: &str) -> Self {
        match backend_id {
            "ollama" | "lmstudio" => ProxyStrategy::NoProxy,
            _ => ProxyStrategy::UseGlobal,
        }
    }

    /// Pick the effective proxy. `None` means a direct connection.
    pub fn resolve(
        &self,
        global: Option<&ProxyConfig>,
        custom: Option<&ProxyConfig>,
    ) -> Option<ProxyConfig> {
        match self {
            ProxyStrategy::UseGlobal => global.cloned(),
            ProxyStrategy::NoProxy => None,
            ProxyStrategy::Custom => custom.cloned(),
        }
    }
}
