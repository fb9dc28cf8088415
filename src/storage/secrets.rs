//! Encrypted Secret Store
//!
//! API keys and proxy passwords live in `secrets.enc`, a JSON map sealed
//! with AES-256-GCM. The 256-bit key is generated on first use and kept
//! next to it in `secret.key`. Secrets never touch `config.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use prompt_studio_llm::credentials::{CredentialSource, CREDENTIAL_SERVICE, OPENAI_ACCOUNT};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{ensure_prompt_studio_dir, secret_key_path_in, secrets_path_in};

/// AES-256-GCM nonce size in bytes
const NONCE_SIZE: usize = 12;

/// AES-256 key size in bytes
const KEY_SIZE: usize = 32;

/// Account holding the proxy password
pub const PROXY_PASSWORD_ACCOUNT: &str = "proxy_password";

/// Environment variable consulted when no hosted API key is stored
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Encrypted file-backed secret storage
#[derive(Debug)]
pub struct SecretStore {
    secrets_path: PathBuf,
    key_path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl SecretStore {
    /// Open the store in the default data directory
    pub fn new() -> AppResult<Self> {
        let dir = ensure_prompt_studio_dir()?;
        Self::open(&dir)
    }

    /// Open (or create) the store inside `dir`
    pub fn open(dir: &Path) -> AppResult<Self> {
        fs::create_dir_all(dir)?;
        let store = Self {
            secrets_path: secrets_path_in(dir),
            key_path: secret_key_path_in(dir),
            entries: RwLock::new(BTreeMap::new()),
        };

        let key = store.load_or_create_key()?;
        let entries = store.load_entries(&key)?;
        debug!("[Secrets] Loaded {} secret(s)", entries.len());
        *store.write_entries()? = entries;

        Ok(store)
    }

    /// Store a secret, replacing any previous value
    pub fn set(&self, account: &str, secret: &str) -> AppResult<()> {
        if account.trim().is_empty() {
            return Err(AppError::validation("Secret account must not be empty"));
        }
        let mut entries = self.write_entries()?;
        let mut updated = entries.clone();
        updated.insert(account.to_string(), secret.to_string());
        // Memory only changes once the file is written
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    /// Retrieve a stored secret
    pub fn get(&self, account: &str) -> AppResult<Option<String>> {
        Ok(self.read_entries()?.get(account).cloned())
    }

    /// Delete a secret; deleting a missing one is not an error
    pub fn delete(&self, account: &str) -> AppResult<()> {
        let mut entries = self.write_entries()?;
        if !entries.contains_key(account) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(account);
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    /// List accounts with a stored secret
    pub fn list(&self) -> AppResult<Vec<String>> {
        Ok(self.read_entries()?.keys().cloned().collect())
    }

    /// Check whether a secret is stored for an account
    pub fn has(&self, account: &str) -> bool {
        self.read_entries()
            .map(|entries| entries.contains_key(account))
            .unwrap_or(false)
    }

    /// Check if the store can still decrypt its file
    pub fn is_healthy(&self) -> bool {
        match self.read_key() {
            Ok(key) => self.load_entries(&key).is_ok(),
            Err(_) => false,
        }
    }

    fn read_entries(&self) -> AppResult<std::sync::RwLockReadGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .read()
            .map_err(|e| AppError::internal(format!("Secret store lock poisoned: {}", e)))
    }

    fn write_entries(
        &self,
    ) -> AppResult<std::sync::RwLockWriteGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .write()
            .map_err(|e| AppError::internal(format!("Secret store lock poisoned: {}", e)))
    }

    fn read_key(&self) -> AppResult<[u8; KEY_SIZE]> {
        let encoded = fs::read_to_string(&self.key_path)?;
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::secret(format!("Invalid key file encoding: {}", e)))?;
        bytes
            .try_into()
            .map_err(|_| AppError::secret("Key file has the wrong length"))
    }

    fn load_or_create_key(&self) -> AppResult<[u8; KEY_SIZE]> {
        if self.key_path.exists() {
            return self.read_key();
        }

        if self.secrets_path.exists() {
            return Err(AppError::secret(format!(
                "{} exists but its key file {} is missing",
                self.secrets_path.display(),
                self.key_path.display()
            )));
        }

        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        write_private(&self.key_path, BASE64.encode(key).as_bytes())?;
        debug!("[Secrets] Generated new key at {}", self.key_path.display());
        Ok(key)
    }

    fn load_entries(&self, key: &[u8; KEY_SIZE]) -> AppResult<BTreeMap<String, String>> {
        if !self.secrets_path.exists() {
            return Ok(BTreeMap::new());
        }
        let encoded = fs::read_to_string(&self.secrets_path)?;
        let plaintext = decrypt(encoded.trim(), key)?;
        Ok(serde_json::from_str(&plaintext)?)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> AppResult<()> {
        let key = self.read_key()?;
        let plaintext = serde_json::to_string(entries)?;
        let sealed = encrypt(&plaintext, &key)?;
        write_private(&self.secrets_path, sealed.as_bytes())
    }
}

impl CredentialSource for SecretStore {
    fn get_credential(&self, service: &str, account: &str) -> Option<String> {
        if service != CREDENTIAL_SERVICE {
            return None;
        }
        match self.get(account) {
            Ok(Some(secret)) => Some(secret),
            Ok(None) if account == OPENAI_ACCOUNT => std::env::var(OPENAI_API_KEY_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty()),
            Ok(None) => None,
            Err(e) => {
                warn!("[Secrets] Lookup for '{}' failed: {}", account, e);
                None
            }
        }
    }
}

/// Encrypt plaintext into base64(nonce || ciphertext)
fn encrypt(plaintext: &str, key: &[u8; KEY_SIZE]) -> AppResult<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| AppError::secret(format!("Encryption failed: {}", e)))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(combined))
}

fn decrypt(encoded: &str, key: &[u8; KEY_SIZE]) -> AppResult<String> {
    let combined = BASE64
        .decode(encoded)
        .map_err(|e| AppError::secret(format!("Invalid secrets file encoding: {}", e)))?;

    if combined.len() < NONCE_SIZE {
        return Err(AppError::secret("Secrets file is truncated"));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| AppError::secret("Failed to decrypt secrets file (wrong key or corrupted)"))?;

    String::from_utf8(plaintext)
        .map_err(|e| AppError::secret(format!("Decrypted secrets are not UTF-8: {}", e)))
}

/// Write a file readable only by the current user
fn write_private(path: &Path, contents: &[u8]) -> AppResult<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
