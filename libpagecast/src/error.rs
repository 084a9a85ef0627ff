//! Error types for Pagecast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PagecastError>;

#[derive(Error, Debug)]
pub enum PagecastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Token encryption error: {0}")]
    Crypto(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid schedule time: {0}")]
    InvalidScheduleTime(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Account expired: {0}")]
    AccountExpired(String),
}

impl PagecastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PagecastError::InvalidInput(_)
            | PagecastError::Validation(_)
            | PagecastError::InvalidScheduleTime(_) => 3,
            PagecastError::Platform(PlatformError::Authentication(_))
            | PagecastError::AccountExpired(_)
            | PagecastError::Unauthorized(_) => 2,
            PagecastError::Platform(_)
            | PagecastError::Config(_)
            | PagecastError::Database(_)
            | PagecastError::Crypto(_)
            | PagecastError::NotFound(_)
            | PagecastError::Conflict(_) => 1,
        }
    }

    /// Whether this error is a caller mistake rather than an infrastructure failure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PagecastError::InvalidInput(_)
                | PagecastError::Validation(_)
                | PagecastError::NotFound(_)
                | PagecastError::Unauthorized(_)
                | PagecastError::InvalidScheduleTime(_)
                | PagecastError::Conflict(_)
                | PagecastError::AccountExpired(_)
        )
    }

    /// Whether a publish attempt that failed with this error may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            PagecastError::Platform(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Column serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Adapter-level failure talking to a social platform
///
/// Messages carry the platform name and the raw upstream message so that
/// operators can tell rate limits, revoked tokens and rejected content apart.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Platform not configured: {0}")]
    NotConfigured(String),
}

impl PlatformError {
    /// Transient failures are worth another attempt; rejections are not
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::Network(_) | PlatformError::RateLimit(_) | PlatformError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = PagecastError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_schedule_time() {
        let error = PagecastError::InvalidScheduleTime("in the past".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = PagecastError::Platform(PlatformError::Authentication("revoked".to_string()));
        assert_eq!(error.exit_code(), 2);

        let expired = PagecastError::AccountExpired("acct-1".to_string());
        assert_eq!(expired.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_database_error() {
        let db_error = DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));
        let error = PagecastError::Database(db_error);
        assert_eq!(error.exit_code(), 1);
        assert!(!error.is_client_error());
    }

    #[test]
    fn test_error_message_formatting() {
        let error = PagecastError::Platform(PlatformError::RateLimit(
            "twitter: Too many requests".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: Rate limit exceeded: twitter: Too many requests"
        );

        let config_error = ConfigError::InvalidValue {
            field: "publishing.request_timeout".to_string(),
            message: "expected a duration".to_string(),
        };
        assert_eq!(
            config_error.to_string(),
            "Invalid value for publishing.request_timeout: expected a duration"
        );
    }

    #[test]
    fn test_platform_error_retryability() {
        assert!(PlatformError::Network("reset".to_string()).is_retryable());
        assert!(PlatformError::RateLimit("429".to_string()).is_retryable());
        assert!(PlatformError::Timeout("30s".to_string()).is_retryable());

        assert!(!PlatformError::Authentication("401".to_string()).is_retryable());
        assert!(!PlatformError::Validation("too long".to_string()).is_retryable());
        assert!(!PlatformError::Posting("rejected".to_string()).is_retryable());
        assert!(!PlatformError::NotConfigured("instagram".to_string()).is_retryable());
    }

    #[test]
    fn test_only_platform_errors_are_retryable() {
        let error: PagecastError = PlatformError::Timeout("linkedin".to_string()).into();
        assert!(error.is_retryable());

        assert!(!PagecastError::AccountExpired("acct".to_string()).is_retryable());
        assert!(!PagecastError::NotFound("acct".to_string()).is_retryable());
    }

    #[test]
    fn test_client_errors() {
        assert!(PagecastError::Conflict("cancelled".to_string()).is_client_error());
        assert!(PagecastError::Unauthorized("other user".to_string()).is_client_error());
        assert!(!PagecastError::Crypto("bad key".to_string()).is_client_error());
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let platform_error = PlatformError::Posting("test".to_string());
        let error: PagecastError = platform_error.into();

        match error {
            PagecastError::Platform(_) => {}
            _ => panic!("Expected PagecastError::Platform"),
        }
    }
}
