//! Backend Settings
//!
//! Everything the registry needs to build the default connectors: endpoint
//! URLs, timeouts, proxy routing and user-defined custom backends.

use std::collections::BTreeMap;

use prompt_studio_core::proxy::{ProxyConfig, ProxyStrategy};
use serde::{Deserialize, Serialize};

use crate::dialect::PayloadTemplate;
use crate::types::{CompletionOptions, DEFAULT_TIMEOUT_SECS};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";

/// Ids of the built-in backends, in registration order.
pub const BUILTIN_BACKENDS: &[&str] = &["openai", "ollama", "lmstudio"];

/// A user-defined HTTP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomBackendConfig {
    pub id: String,
    pub display_name: String,
    /// Full endpoint URL; the payload is POSTed here
    pub url: String,
    pub payload_template: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Secret-store account holding a bearer credential, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_account: Option<String>,
}

impl CustomBackendConfig {
    /// Validate the definition
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Custom backend id must not be empty".to_string());
        }
        if BUILTIN_BACKENDS.contains(&self.id.as_str()) {
            return Err(format!("Custom backend id '{}' is reserved", self.id));
        }
        let url = url::Url::parse(&self.url)
            .map_err(|e| format!("Custom backend '{}' has an invalid URL: {}", self.id, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "Custom backend '{}' must use http or https, not {}",
                self.id,
                url.scheme()
            ));
        }
        let sample = CompletionOptions::default()
            .with_system("system")
            .with_temperature(0.7)
            .with_max_tokens(256);
        PayloadTemplate::new(self.payload_template.clone())
            .render("default", "prompt", &sample)
            .map(|_| ())
            .map_err(|e| format!("Custom backend '{}': {}", self.id, e))
    }
}

/// Connection settings for every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub openai_base_url: String,
    pub openai_model: String,
    pub ollama_base_url: String,
    pub lmstudio_base_url: String,
    pub timeout_secs: u64,
    /// Global proxy, used by backends whose strategy is `use_global`
    pub proxy: Option<ProxyConfig>,
    /// Per-backend strategy; missing entries use [`ProxyStrategy::default_for`]
    pub proxy_strategies: BTreeMap<String, ProxyStrategy>,
    /// Per-backend proxies for the `custom` strategy
    pub proxy_overrides: BTreeMap<String, ProxyConfig>,
    pub custom_backends: Vec<CustomBackendConfig>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            lmstudio_base_url: DEFAULT_LMSTUDIO_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            proxy: None,
            proxy_strategies: BTreeMap::new(),
            proxy_overrides: BTreeMap::new(),
            custom_backends: Vec::new(),
        }
    }
}

impl BackendSettings {
    /// Effective proxy for one backend. `None` means a direct connection.
    pub fn proxy_for(&self, backend_id: &str) -> Option<ProxyConfig> {
        self.proxy_strategies
            .get(backend_id)
            .copied()
            .unwrap_or_else(|| ProxyStrategy::default_for(backend_id))
            .resolve(self.proxy.as_ref(), self.proxy_overrides.get(backend_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prompt_studio_core::proxy::ProxyProtocol;

    fn custom(id: &str, url: &str, template: &str) -> CustomBackendConfig {
        CustomBackendConfig {
            id: id.to_string(),
            display_name: id.to_string(),
            url: url.to_string(),
            payload_template: template.to_string(),
            headers: BTreeMap::new(),
            credential_account: None,
        }
    }

    #[test]
    fn test_custom_validation() {
        let ok = custom("mine", "http://localhost:9000/gen", r#"{"q": "{prompt}", "t": {temperature}}"#);
        assert!(ok.validate().is_ok());

        assert!(custom("openai", "http://x", "{}").validate().is_err());
        assert!(custom("", "http://x", "{}").validate().is_err());
        assert!(custom("a", "not a url", "{}").validate().is_err());
        assert!(custom("a", "ftp://host/x", "{}").validate().is_err());
        assert!(custom("a", "http://host/x", "{prompt}").validate().is_err());
    }

    #[test]
    fn test_proxy_routing() {
        let mut settings = BackendSettings {
            proxy: Some(ProxyConfig {
                protocol: ProxyProtocol::Http,
                host: "proxy".to_string(),
                port: 3128,
                username: None,
                password: None,
            }),
            ..Default::default()
        };
        assert!(settings.proxy_for("openai").is_some());
        assert!(settings.proxy_for("ollama").is_none());

        settings
            .proxy_strategies
            .insert("openai".to_string(), ProxyStrategy::NoProxy);
        assert!(settings.proxy_for("openai").is_none());
    }

    #[test]
    fn test_settings_defaults_from_partial_json() {
        let settings: BackendSettings =
            serde_json::from_str(r#"{"ollama_base_url": "http://gpu-box:11434"}"#).unwrap();
        assert_eq!(settings.ollama_base_url, "http://gpu-box:11434");
        assert_eq!(settings.openai_base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(settings.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }
}
