use std::path::Path;

use crate::models::Settings;
use crate::utils::config;

const REDACTED_KEY: &str = "********";

fn redacted(mut settings: Settings) -> Settings {
    if !settings.ai.api_key.is_empty() {
        settings.ai.api_key = REDACTED_KEY.to_string();
    }
    settings
}

/// Effective settings for display; the API key is masked.
pub fn get_settings(data_dir: &Path) -> Result<Settings, String> {
    config::load_settings(data_dir)
        .map(redacted)
        .map_err(|e| e.to_string())
}

/// Takes effect for sessions started after the update. A masked key keeps
/// the stored one.
pub fn update_settings(data_dir: &Path, settings: &Settings) -> Result<(), String> {
    let mut settings = settings.clone();
    if settings.ai.api_key == REDACTED_KEY {
        settings.ai.api_key = config::load_stored_settings(data_dir)
            .map_err(|e| e.to_string())?
            .ai
            .api_key;
    }
    config::save_settings(data_dir, &settings).map_err(|e| e.to_string())
}

/// Set one field by dotted path, e.g. `notifications.cooldown_minutes 45`.
/// The value is read as JSON, falling back to a plain string.
pub fn set_setting(data_dir: &Path, key: &str, raw_value: &str) -> Result<Settings, String> {
    let current = config::load_stored_settings(data_dir).map_err(|e| e.to_string())?;
    let mut tree = serde_json::to_value(&current).map_err(|e| e.to_string())?;

    let pointer = format!("/{}", key.trim().replace('.', "/"));
    let slot = tree
        .pointer_mut(&pointer)
        .ok_or_else(|| format!("unknown setting: {}", key))?;
    *slot = serde_json::from_str(raw_value)
        .unwrap_or_else(|_| serde_json::Value::String(raw_value.to_string()));

    let updated: Settings = serde_json::from_value(tree)
        .map_err(|e| format!("invalid value for {}: {}", key, e))?;
    config::save_settings(data_dir, &updated).map_err(|e| e.to_string())?;
    Ok(redacted(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_setting_updates_one_field() {
        let dir = tempfile::tempdir().unwrap();
        let updated = set_setting(dir.path(), "notifications.cooldown_minutes", "45").unwrap();
        assert_eq!(updated.notifications.cooldown_minutes, 45);
        assert_eq!(
            get_settings(dir.path()).unwrap().notifications.cooldown_minutes,
            45
        );

        assert!(set_setting(dir.path(), "notifications.snooze", "1").is_err());
        assert!(set_setting(dir.path(), "notifications.cooldown_minutes", "soon").is_err());
        assert!(set_setting(dir.path(), "notifications.cooldown_minutes", "-5").is_err());
        assert_eq!(
            config::load_stored_settings(dir.path())
                .unwrap()
                .notifications
                .cooldown_minutes,
            45
        );
    }

    #[test]
    fn displayed_key_is_masked_and_kept_on_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.ai.api_key = "sk-stored".to_string();
        config::save_settings(dir.path(), &settings).unwrap();

        let shown = get_settings(dir.path()).unwrap();
        assert_eq!(shown.ai.api_key, REDACTED_KEY);

        update_settings(dir.path(), &shown).unwrap();
        assert_eq!(
            config::load_stored_settings(dir.path()).unwrap().ai.api_key,
            "sk-stored"
        );
    }
}
