//! Backend Registry
//!
//! Maps backend ids to connectors, keeping first-registration order so
//! listings are stable.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::connector::Connector;
use crate::credentials::CredentialSource;
use crate::http_connector::HttpConnector;
use crate::settings::BackendSettings;
use crate::types::{BackendDescriptor, LlmError, LlmResult};

#[derive(Default)]
pub struct BackendRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
    order: Vec<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `openai`, `ollama` and `lmstudio`, then every valid custom
    /// backend from the settings. Invalid custom definitions are skipped.
    pub fn with_defaults(
        settings: &BackendSettings,
        credentials: Arc<dyn CredentialSource>,
    ) -> LlmResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(HttpConnector::openai(settings, credentials.clone())?));
        registry.register(Arc::new(HttpConnector::ollama(settings)?));
        registry.register(Arc::new(HttpConnector::lmstudio(settings)?));

        for custom in &settings.custom_backends {
            match HttpConnector::custom(custom, settings, credentials.clone()) {
                Ok(connector) => registry.register(Arc::new(connector)),
                Err(e) => warn!("[Registry] Skipping custom backend '{}': {}", custom.id, e),
            }
        }
        Ok(registry)
    }

    /// Insert or replace by id. A replaced backend keeps its position.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        let id = connector.id().to_string();
        if self.connectors.insert(id.clone(), connector).is_none() {
            self.order.push(id.clone());
            info!("[Registry] Registered backend '{}'", id);
        } else {
            info!("[Registry] Replaced backend '{}'", id);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<dyn Connector>> {
        let removed = self.connectors.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(id).cloned()
    }

    /// Like [`get`](Self::get), but an unknown id is an error.
    pub fn require(&self, id: &str) -> LlmResult<Arc<dyn Connector>> {
        self.get(id).ok_or_else(|| LlmError::UnknownBackend {
            backend: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connectors.contains_key(id)
    }

    /// Backend ids in registration order.
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.connectors.get(id))
            .map(|c| c.descriptor().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::NoCredentials;
    use crate::settings::CustomBackendConfig;
    use std::collections::BTreeMap;

    fn custom(id: &str, template: &str) -> CustomBackendConfig {
        CustomBackendConfig {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            url: "http://localhost:9000/generate".to_string(),
            payload_template: template.to_string(),
            headers: BTreeMap::new(),
            credential_account: None,
        }
    }

    #[test]
    fn test_defaults_in_order() {
        let settings = BackendSettings {
            custom_backends: vec![
                custom("mine", r#"{"q": "{prompt}"}"#),
                custom("broken", "{prompt}"),
            ],
            ..Default::default()
        };
        let registry = BackendRegistry::with_defaults(&settings, Arc::new(NoCredentials)).unwrap();
        assert_eq!(registry.list(), vec!["openai", "ollama", "lmstudio", "mine"]);

        let descriptors = registry.descriptors();
        assert!(descriptors[0].requires_credential());
        assert!(!descriptors[1].requires_credential());
        assert!(!descriptors[3].supports_streaming);
    }

    #[test]
    fn test_replace_keeps_position_and_remove() {
        let settings = BackendSettings::default();
        let mut registry = BackendRegistry::with_defaults(&settings, Arc::new(NoCredentials)).unwrap();

        let replacement = HttpConnector::ollama(&BackendSettings {
            ollama_base_url: "http://gpu-box:11434".to_string(),
            ..Default::default()
        })
        .unwrap();
        registry.register(Arc::new(replacement));
        assert_eq!(registry.list(), vec!["openai", "ollama", "lmstudio"]);
        assert_eq!(
            registry.get("ollama").unwrap().descriptor().base_url,
            "http://gpu-box:11434"
        );

        assert!(registry.remove("openai").is_some());
        assert!(registry.remove("openai").is_none());
        assert_eq!(registry.len(), 2);
        assert!(matches!(
            registry.require("openai"),
            Err(LlmError::UnknownBackend { .. })
        ));
    }
}
