//! Error types for the alert engine
//!
//! Errors are classified by recoverability:
//! - Retryable: Network issues, timeouts, rate limits
//! - NonRetryable: Configuration errors, bad state files
//! - RequiresUserAction: Missing calendar authorization

use std::path::PathBuf;
use thiserror::Error;

/// Error types for engine startup and cycle execution
#[derive(Debug, Error)]
pub enum EngineError {
    // Retryable errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("API rate limit exceeded")]
    ApiRateLimit,

    // Non-retryable errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Db(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Popup spawn failed: {0}")]
    PopupSpawn(String),

    // Requires user action
    #[error("Calendar authorization not found at {0}")]
    CalendarAuthMissing(PathBuf),

    #[error("Calendar token expired or revoked")]
    CalendarAuthExpired,
}

impl EngineError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Network(_) | EngineError::Timeout(_) | EngineError::ApiRateLimit
        )
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            EngineError::CalendarAuthMissing(_) | EngineError::CalendarAuthExpired
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EngineError::Network(_) => "Check your internet connection and try again.",
            EngineError::Timeout(_) => "The operation took too long. Try again.",
            EngineError::ApiRateLimit => "Wait a few minutes and try again.",
            EngineError::Configuration(_) => "Check your configuration in ~/.vigil/config.json",
            EngineError::Db(_) => "Check that ~/.vigil is writable and not full.",
            EngineError::Io(_) => "Check file permissions and disk space.",
            EngineError::PopupSpawn(_) => "Check the popup command in ~/.vigil/config.json",
            EngineError::CalendarAuthMissing(_) => {
                "Provision a Google token at ~/.vigil/google/token.json"
            }
            EngineError::CalendarAuthExpired => {
                "Re-provision the Google token; the refresh grant was revoked."
            }
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::Network("dns".into()).is_retryable());
        assert!(EngineError::ApiRateLimit.is_retryable());
        assert!(!EngineError::Configuration("bad".into()).is_retryable());
    }

    #[test]
    fn test_auth_requires_user_action() {
        let err = EngineError::CalendarAuthMissing(PathBuf::from("/tmp/token.json"));
        assert!(err.requires_user_action());
        assert!(!err.is_retryable());
    }
}
