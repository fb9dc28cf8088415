//! JSON Configuration Management
//!
//! Handles reading and writing the application configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path_in, ensure_prompt_studio_dir};

/// Configuration service for managing app settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigService {
    /// Create a new config service in the default data directory
    pub fn new() -> AppResult<Self> {
        let dir = ensure_prompt_studio_dir()?;
        Self::open(&config_path_in(&dir))
    }

    /// Load an existing config file, or create one with defaults
    pub fn open(config_path: &Path) -> AppResult<Self> {
        let config = if config_path.exists() {
            Self::load_from_file(config_path)?
        } else {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let default_config = AppConfig::default();
            Self::save_to_file(config_path, &default_config)?;
            info!("[Config] Created default config at {}", config_path.display());
            default_config
        };

        Ok(Self {
            config_path: config_path.to_path_buf(),
            config,
        })
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<AppConfig> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::config)?;
        Ok(config)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, config: &AppConfig) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// Get a clone of the current configuration
    pub fn get_config_clone(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Update the configuration with a partial update.
    ///
    /// An update that fails validation leaves both memory and disk unchanged.
    pub fn update_config(&mut self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut candidate = self.config.clone();
        candidate.apply_update(update);
        Self::save_to_file(&self.config_path, &candidate)?;
        self.config = candidate;
        Ok(self.config.clone())
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &self.config)
    }

    /// Reload configuration from disk
    pub fn reload(&mut self) -> AppResult<()> {
        self.config = Self::load_from_file(&self.config_path)?;
        Ok(())
    }

    /// Reset configuration to defaults
    pub fn reset(&mut self) -> AppResult<()> {
        self.config = AppConfig::default();
        self.save()?;
        Ok(())
    }

    /// Check if the config service is healthy
    pub fn is_healthy(&self) -> bool {
        self.config_path.exists() && self.config.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_config_file() -> (NamedTempFile, PathBuf) {
        let mut file = NamedTempFile::new().unwrap();
        let config = AppConfig::default();
        let content = serde_json::to_string_pretty(&config).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let path = file.path().to_path_buf();
        (file, path)
    }

    #[test]
    fn test_load_config_from_file() {
        let (_file, path) = create_test_config_file();
        let config = ConfigService::load_from_file(&path).unwrap();
        assert_eq!(config.theme, "system");
    }

    #[test]
    fn test_open_creates_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("sub").join("config.json");

        let service = ConfigService::open(&path).unwrap();
        assert!(path.exists());
        assert!(service.is_healthy());
        assert_eq!(service.get_config(), &AppConfig::default());
    }

    #[test]
    fn test_config_update() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut service = ConfigService::open(&path).unwrap();

        let update = SettingsUpdate {
            theme: Some("dark".to_string()),
            ..Default::default()
        };

        let updated = service.update_config(update).unwrap();
        assert_eq!(updated.theme, "dark");

        service.reload().unwrap();
        assert_eq!(service.get_config().theme, "dark");
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut service = ConfigService::open(&path).unwrap();

        let update = SettingsUpdate {
            request_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(service.update_config(update).is_err());
        assert_eq!(service.get_config().request_timeout_secs, 60);

        service.reload().unwrap();
        assert_eq!(service.get_config().request_timeout_secs, 60);
    }

    #[test]
    fn test_reset() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut service = ConfigService::open(&path).unwrap();
        service
            .update_config(SettingsUpdate {
                default_backend: Some("ollama".to_string()),
                ..Default::default()
            })
            .unwrap();

        service.reset().unwrap();
        assert_eq!(service.get_config().default_backend, "openai");
    }
}
