use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::models::Settings;

const ENV_API_KEY: &str = "AURAFLOW_API_KEY";
const ENV_DATA_DIR: &str = "AURAFLOW_DATA_DIR";
const ENV_OWNER: &str = "AURAFLOW_OWNER";

const DEFAULT_DATA_DIR: &str = "auraflow-data";
const DEFAULT_OWNER: &str = "default";
const DATABASE_FILE: &str = "auraflow.db";

pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn api_key_from_env() -> Option<String> {
    env_value(ENV_API_KEY)
}

pub fn resolve_api_key(explicit_key: &str) -> String {
    let trimmed = explicit_key.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    api_key_from_env().unwrap_or_default()
}

pub fn apply_env_defaults(settings: &mut Settings) {
    if settings.ai.api_key.trim().is_empty() {
        settings.ai.api_key = api_key_from_env().unwrap_or_default();
    }
}

pub fn data_dir() -> PathBuf {
    env_value(ENV_DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn owner_id() -> String {
    env_value(ENV_OWNER).unwrap_or_else(|| DEFAULT_OWNER.to_string())
}

pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config").join("settings.json")
}

/// Settings exactly as stored on disk; missing file → defaults.
pub fn load_stored_settings(data_dir: &Path) -> EngineResult<Settings> {
    let path = settings_path(data_dir);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
}

/// Stored settings with the environment filling what the file leaves empty.
pub fn load_settings(data_dir: &Path) -> EngineResult<Settings> {
    let mut settings = load_stored_settings(data_dir)?;
    apply_env_defaults(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Write settings as pretty JSON. A key that only came from the
/// environment is not written to disk.
pub fn save_settings(data_dir: &Path, settings: &Settings) -> EngineResult<()> {
    settings.validate()?;
    let mut stored = settings.clone();
    if api_key_from_env().as_deref() == Some(stored.ai.api_key.trim()) {
        stored.ai.api_key.clear();
    }

    let path = settings_path(data_dir);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| EngineError::Config(e.to_string()))?;
    }
    let content = serde_json::to_string_pretty(&stored)?;
    std::fs::write(&path, content).map_err(|e| EngineError::Config(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_through_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = load_settings(dir.path()).unwrap();
        assert_eq!(defaults.risk.cache_ttl_secs, 300);

        let mut custom = defaults.clone();
        custom.notifications.cooldown_minutes = 45;
        custom.ai.enabled = false;
        save_settings(dir.path(), &custom).unwrap();
        assert!(settings_path(dir.path()).exists());

        let loaded = load_settings(dir.path()).unwrap();
        assert_eq!(loaded.notifications.cooldown_minutes, 45);
        assert!(!loaded.ai.enabled);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.risk.cache_ttl_secs = 0;
        assert!(matches!(
            save_settings(dir.path(), &settings),
            Err(EngineError::Config(_))
        ));

        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(settings_path(dir.path()), "{ not json").unwrap();
        assert!(load_settings(dir.path()).is_err());
    }

    #[test]
    fn env_key_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(ENV_API_KEY, "sk-from-env-only");
        let loaded = load_settings(dir.path()).unwrap();
        assert_eq!(loaded.ai.api_key, "sk-from-env-only");

        save_settings(dir.path(), &loaded).unwrap();
        std::env::remove_var(ENV_API_KEY);

        let written = std::fs::read_to_string(settings_path(dir.path())).unwrap();
        assert!(!written.contains("sk-from-env-only"));
        assert!(load_stored_settings(dir.path()).unwrap().ai.api_key.is_empty());
    }

    #[test]
    fn explicit_key_wins() {
        assert_eq!(resolve_api_key("  sk-123 "), "sk-123");
    }
}
