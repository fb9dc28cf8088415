//! Cross-Platform Path Utilities
//!
//! Resolves the application data directory (`~/.prompt-studio/` unless
//! `PROMPT_STUDIO_HOME` points elsewhere) and the files inside it.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "PROMPT_STUDIO_HOME";

const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "prompts.db";
const SECRETS_FILE: &str = "secrets.enc";
const SECRET_KEY_FILE: &str = "secret.key";

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the Prompt Studio directory (~/.prompt-studio/)
pub fn prompt_studio_dir() -> AppResult<PathBuf> {
    match std::env::var_os(HOME_ENV) {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => Ok(home_dir()?.join(".prompt-studio")),
    }
}

/// Get the config file path inside a data directory
pub fn config_path_in(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Get the database file path inside a data directory
pub fn database_path_in(dir: &Path) -> PathBuf {
    dir.join(DATABASE_FILE)
}

/// Get the encrypted secrets file path inside a data directory
pub fn secrets_path_in(dir: &Path) -> PathBuf {
    dir.join(SECRETS_FILE)
}

/// Get the secret key file path inside a data directory
pub fn secret_key_path_in(dir: &Path) -> PathBuf {
    dir.join(SECRET_KEY_FILE)
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the Prompt Studio directory, creating if it doesn't exist
pub fn ensure_prompt_studio_dir() -> AppResult<PathBuf> {
    let path = prompt_studio_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_inside_data_dir() {
        let dir = Path::new("/tmp/ps");
        assert_eq!(config_path_in(dir), PathBuf::from("/tmp/ps/config.json"));
        assert_eq!(database_path_in(dir), PathBuf::from("/tmp/ps/prompts.db"));
        assert_eq!(secrets_path_in(dir), PathBuf::from("/tmp/ps/secrets.enc"));
        assert_eq!(secret_key_path_in(dir), PathBuf::from("/tmp/ps/secret.key"));
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();
    }
}
