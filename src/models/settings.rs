//! Settings Models
//!
//! Application configuration and settings data structures.

use std::collections::BTreeMap;

use prompt_studio_core::proxy::{ProxyConfig, ProxyStrategy};
use prompt_studio_llm::settings::{
    BackendSettings, CustomBackendConfig, BUILTIN_BACKENDS, DEFAULT_LMSTUDIO_BASE_URL,
    DEFAULT_OLLAMA_BASE_URL, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL,
};
use prompt_studio_llm::DEFAULT_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// UI theme: "light", "dark", or "system"
    pub theme: String,
    /// Backend used when a command does not name one
    pub default_backend: String,
    /// Model used when a command does not name one
    pub default_model: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub ollama_base_url: String,
    pub lmstudio_base_url: String,
    /// Per-request timeout; the idle timeout while streaming
    pub request_timeout_secs: u64,
    pub proxy: Option<ProxyConfig>,
    /// Per-backend proxy strategy overrides
    pub proxy_strategies: BTreeMap<String, ProxyStrategy>,
    pub custom_backends: Vec<CustomBackendConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme: "system".to_string(),
            default_backend: "openai".to_string(),
            default_model: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            lmstudio_base_url: DEFAULT_LMSTUDIO_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            proxy: None,
            proxy_strategies: BTreeMap::new(),
            custom_backends: Vec::new(),
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub theme: Option<String>,
    pub default_backend: Option<String>,
    /// `Some(None)` clears the default model
    pub default_model: Option<Option<String>>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub ollama_base_url: Option<String>,
    pub lmstudio_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    /// `Some(None)` removes the proxy
    pub proxy: Option<Option<ProxyConfig>>,
    pub custom_backends: Option<Vec<CustomBackendConfig>>,
}

impl SettingsUpdate {
    /// Build an update from a single `key value` pair, as given on the
    /// command line. Structured fields (`proxy`, `custom_backends`) take JSON.
    pub fn from_key_value(key: &str, value: &str) -> Result<Self, String> {
        let mut update = SettingsUpdate::default();
        let text = value.trim().to_string();
        match key {
            "theme" => update.theme = Some(text),
            "default_backend" => update.default_backend = Some(text),
            "default_model" => {
                update.default_model = Some(if text.is_empty() { None } else { Some(text) })
            }
            "openai_base_url" => update.openai_base_url = Some(text),
            "openai_model" => update.openai_model = Some(text),
            "ollama_base_url" => update.ollama_base_url = Some(text),
            "lmstudio_base_url" => update.lmstudio_base_url = Some(text),
            "request_timeout_secs" => {
                let secs = text
                    .parse::<u64>()
                    .map_err(|_| format!("request_timeout_secs must be a number, got '{}'", text))?;
                update.request_timeout_secs = Some(secs);
            }
            "proxy" => {
                update.proxy = Some(if text.is_empty() || text == "null" {
                    None
                } else {
                    Some(serde_json::from_str(&text).map_err(|e| format!("Invalid proxy: {}", e))?)
                })
            }
            "custom_backends" => {
                update.custom_backends = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| format!("Invalid custom_backends: {}", e))?,
                )
            }
            other => return Err(format!("Unknown setting: {}", other)),
        }
        Ok(update)
    }
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(theme) = update.theme {
            self.theme = theme;
        }
        if let Some(backend) = update.default_backend {
            self.default_backend = backend;
        }
        if let Some(model) = update.default_model {
            self.default_model = model;
        }
        if let Some(url) = update.openai_base_url {
            self.openai_base_url = url;
        }
        if let Some(model) = update.openai_model {
            self.openai_model = model;
        }
        if let Some(url) = update.ollama_base_url {
            self.ollama_base_url = url;
        }
        if let Some(url) = update.lmstudio_base_url {
            self.lmstudio_base_url = url;
        }
        if let Some(secs) = update.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(proxy) = update.proxy {
            self.proxy = proxy;
        }
        if let Some(custom) = update.custom_backends {
            self.custom_backends = custom;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        // Validate theme
        if !["light", "dark", "system"].contains(&self.theme.as_str()) {
            return Err(format!(
                "Invalid theme: {}. Must be 'light', 'dark', or 'system'",
                self.theme
            ));
        }

        for (field, url) in [
            ("openai_base_url", &self.openai_base_url),
            ("ollama_base_url", &self.ollama_base_url),
            ("lmstudio_base_url", &self.lmstudio_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("{} must be an http(s) URL, got '{}'", field, url));
            }
        }

        if self.request_timeout_secs == 0 || self.request_timeout_secs > 3600 {
            return Err("request_timeout_secs must be between 1 and 3600".to_string());
        }

        let known = BUILTIN_BACKENDS
            .iter()
            .any(|id| *id == self.default_backend)
            || self
                .custom_backends
                .iter()
                .any(|c| c.id == self.default_backend);
        if !known {
            return Err(format!("Unknown default_backend: {}", self.default_backend));
        }

        let mut seen = std::collections::HashSet::new();
        for custom in &self.custom_backends {
            if !seen.insert(custom.id.as_str()) {
                return Err(format!("Duplicate custom backend id: {}", custom.id));
            }
            custom.validate()?;
        }

        Ok(())
    }

    /// Connection settings for the backend registry
    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            openai_base_url: self.openai_base_url.clone(),
            openai_model: self.openai_model.clone(),
            ollama_base_url: self.ollama_base_url.clone(),
            lmstudio_base_url: self.lmstudio_base_url.clone(),
            timeout_secs: self.request_timeout_secs,
            proxy: self.proxy.clone(),
            proxy_strategies: self.proxy_strategies.clone(),
            proxy_overrides: BTreeMap::new(),
            custom_backends: self.custom_backends.clone(),
        }
    }
}
