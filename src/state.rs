//! Application State
//!
//! Shared state for the command layer, containing all services.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use prompt_studio_llm::Dispatcher;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::services::execution::{build_dispatcher, ExecutionService};
use crate::storage::secrets::PROXY_PASSWORD_ACCOUNT;
use crate::storage::{ConfigService, Database, SecretStore};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path_in, database_path_in, ensure_dir, prompt_studio_dir};

/// Application state shared by every command
pub struct AppState {
    /// SQLite database with connection pool
    database: Arc<RwLock<Option<Database>>>,
    /// Encrypted secret storage
    secrets: Arc<RwLock<Option<Arc<SecretStore>>>>,
    /// Configuration service for app settings
    config: Arc<RwLock<Option<ConfigService>>>,
    /// Backend dispatcher, rebuilt when settings change
    dispatcher: Arc<RwLock<Option<Dispatcher>>>,
    /// Whether the state has been initialized
    initialized: Arc<RwLock<bool>>,
}

impl AppState {
    /// Create a new uninitialized app state
    pub fn new() -> Self {
        Self {
            database: Arc::new(RwLock::new(None)),
            secrets: Arc::new(RwLock::new(None)),
            config: Arc::new(RwLock::new(None)),
            dispatcher: Arc::new(RwLock::new(None)),
            initialized: Arc::new(RwLock::new(false)),
        }
    }

    /// Initialize all services in the default data directory
    pub async fn initialize(&self) -> AppResult<()> {
        let dir: PathBuf = prompt_studio_dir()?;
        self.initialize_in(&dir).await
    }

    /// Initialize all services with their files under `dir`
    pub async fn initialize_in(&self, dir: &Path) -> AppResult<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }
        ensure_dir(dir)?;

        // Initialize database
        {
            let db = Database::open(&database_path_in(dir))?;
            let mut db_lock = self.database.write().await;
            *db_lock = Some(db);
        }

        // Initialize secrets
        let secrets = Arc::new(SecretStore::open(dir)?);
        *self.secrets.write().await = Some(secrets.clone());

        // Initialize config
        let config = ConfigService::open(&config_path_in(dir))?;
        let dispatcher = build_dispatcher(config.get_config(), secrets)?;
        *self.config.write().await = Some(config);
        *self.dispatcher.write().await = Some(dispatcher);

        info!("[State] Initialized in {}", dir.display());
        *initialized = true;
        Ok(())
    }

    /// Check if database is healthy
    pub fn is_database_healthy(&self) -> bool {
        // Use try_read to avoid blocking
        if let Ok(guard) = self.database.try_read() {
            if let Some(ref db) = *guard {
                return db.is_healthy();
            }
        }
        false
    }

    /// Check if the secret store is healthy
    pub fn is_secrets_healthy(&self) -> bool {
        if let Ok(guard) = self.secrets.try_read() {
            if let Some(ref secrets) = *guard {
                return secrets.is_healthy();
            }
        }
        false
    }

    /// Check if config is healthy
    pub fn is_config_healthy(&self) -> bool {
        if let Ok(guard) = self.config.try_read() {
            if let Some(ref config) = *guard {
                return config.is_healthy();
            }
        }
        false
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> AppResult<AppConfig> {
        let guard = self.config.read().await;
        match &*guard {
            Some(config) => Ok(config.get_config_clone()),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Update the configuration and rebuild the dispatcher
    pub async fn update_config(&self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let updated = {
            let mut guard = self.config.write().await;
            match &mut *guard {
                Some(config) => config.update_config(update)?,
                None => return Err(AppError::config("Config service not initialized")),
            }
        };
        self.rebuild_dispatcher(&updated).await?;
        Ok(updated)
    }

    /// Reset the configuration to defaults
    pub async fn reset_config(&self) -> AppResult<AppConfig> {
        let reset = {
            let mut guard = self.config.write().await;
            match &mut *guard {
                Some(config) => {
                    config.reset()?;
                    config.get_config_clone()
                }
                None => return Err(AppError::config("Config service not initialized")),
            }
        };
        self.rebuild_dispatcher(&reset).await?;
        Ok(reset)
    }

    async fn rebuild_dispatcher(&self, config: &AppConfig) -> AppResult<()> {
        let secrets = self.secret_store().await?;
        let dispatcher = build_dispatcher(config, secrets)?;
        *self.dispatcher.write().await = Some(dispatcher);
        Ok(())
    }

    /// The current dispatcher
    pub async fn dispatcher(&self) -> AppResult<Dispatcher> {
        let guard = self.dispatcher.read().await;
        guard
            .clone()
            .ok_or_else(|| AppError::internal("Dispatcher not initialized"))
    }

    /// An execution service bound to the current dispatcher and database
    pub async fn execution_service(&self) -> AppResult<ExecutionService> {
        let dispatcher = self.dispatcher().await?;
        self.with_database(|db| Ok(ExecutionService::new(dispatcher, db)))
            .await
    }

    async fn secret_store(&self) -> AppResult<Arc<SecretStore>> {
        let guard = self.secrets.read().await;
        guard
            .clone()
            .ok_or_else(|| AppError::secret("Secret store not initialized"))
    }

    /// Store a secret
    pub async fn set_secret(&self, account: &str, secret: &str) -> AppResult<()> {
        self.secret_store().await?.set(account, secret)?;
        if account == PROXY_PASSWORD_ACCOUNT {
            let config = self.get_config().await?;
            self.rebuild_dispatcher(&config).await?;
        }
        Ok(())
    }

    /// Delete a secret
    pub async fn delete_secret(&self, account: &str) -> AppResult<()> {
        self.secret_store().await?.delete(account)?;
        if account == PROXY_PASSWORD_ACCOUNT {
            let config = self.get_config().await?;
            self.rebuild_dispatcher(&config).await?;
        }
        Ok(())
    }

    /// Accounts with a stored secret
    pub async fn list_secrets(&self) -> AppResult<Vec<String>> {
        self.secret_store().await?.list()
    }

    /// Get database access for direct queries
    pub async fn with_database<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Database) -> AppResult<T>,
    {
        let guard = self.database.read().await;
        match &*guard {
            Some(db) => f(db),
            None => Err(AppError::database("Database not initialized")),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("initialized", &self.initialized)
            .finish()
    }
}
