//! Configuration loading and on-disk state locations.
//!
//! Everything mutable at runtime lives on the `Engine` instance constructed
//! at startup; this module only knows where files live under `~/.vigil/`
//! and how to read them.

use std::fs;
use std::path::PathBuf;

use crate::error::EngineError;
use crate::types::Config;

/// Get the state directory (~/.vigil), creating it if absent
pub fn state_dir() -> Result<PathBuf, EngineError> {
    let home = dirs::home_dir()
        .ok_or_else(|| EngineError::Configuration("Could not find home directory".to_string()))?;
    let dir = home.join(".vigil");

    if !dir.exists() {
        fs::create_dir_all(&dir)
            .map_err(|e| EngineError::Io(format!("Failed to create state dir: {}", e)))?;
    }

    Ok(dir)
}

/// Get the canonical config file path (~/.vigil/config.json)
pub fn config_path() -> Result<PathBuf, EngineError> {
    Ok(state_dir()?.join("config.json"))
}

/// Load configuration from ~/.vigil/config.json.
///
/// A missing file is not an error: the engine runs with defaults (no
/// reports configured, so the O3 and weekly branches are dormant).
pub fn load_config() -> Result<Config, EngineError> {
    let path = config_path()?;

    if !path.exists() {
        log::info!(
            "No config at {}, running with defaults (no reports configured)",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| EngineError::Configuration(format!("Failed to read config: {}", e)))?;

    serde_json::from_str(&content)
        .map_err(|e| EngineError::Configuration(format!("Failed to parse config: {}", e)))
}

/// Check calendar authorization at startup.
///
/// The token must exist and carry at least an access or refresh token; an
/// empty `{}` means provisioning never completed. Missing authorization is
/// fatal — the whole engine is useless without calendar reads.
pub fn require_calendar_auth() -> Result<(), EngineError> {
    let token_path = crate::google_api::token_path();
    if !token_path.exists() {
        return Err(EngineError::CalendarAuthMissing(token_path));
    }

    let content = fs::read_to_string(&token_path)
        .map_err(|_| EngineError::CalendarAuthMissing(token_path.clone()))?;

    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(token) => {
            let has_token =
                token.get("token").is_some() || token.get("refresh_token").is_some();
            if has_token {
                Ok(())
            } else {
                Err(EngineError::CalendarAuthMissing(token_path))
            }
        }
        Err(_) => Err(EngineError::CalendarAuthExpired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_when_file_missing() {
        // load_config falls back to defaults rather than failing; the
        // defaults must parse into a dormant-but-valid engine config.
        let config = Config::default();
        assert!(config.reports.is_empty());
        assert!(!config.popup.command.is_empty());
    }
}
