//! Error types shared across the Rover Reminder workspace.

use thiserror::Error;

/// Primary error type for reminder operations.
#[derive(Debug, Error)]
pub enum ReminderError {
    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Record store failure (open, query, write).
    #[error("Storage error: {0}")]
    Storage(String),

    /// User input rejected (bad email, threshold out of range).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Stamina push is switched off globally.
    #[error("Stamina push is disabled in the configuration")]
    PushDisabled,

    /// The account has no notification email and none could be inferred.
    #[error("No notification email set for uid {0}")]
    MissingEmail(String),

    /// Requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias used by all reminder crates.
pub type Result<T> = std::result::Result<T, ReminderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = ReminderError::Validation("threshold must be within 120..=240".into());
        assert_eq!(e.to_string(), "Invalid input: threshold must be within 120..=240");

        let e = ReminderError::MissingEmail("100000001".into());
        assert!(e.to_string().contains("100000001"));
    }

    #[test]
    fn test_io_conversion() {
        fn fails() -> Result<()> {
            Err(std::io::Error::other("disk gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(ReminderError::Io(_))));
    }
}
