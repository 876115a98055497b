//! Error types for Crosspost
//!
//! Platform failures are classified by a structured [`ErrorKind`] assigned at
//! the adapter boundary (from HTTP status and platform error codes). Retry
//! decisions are made on the kind alone, never on message text.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

/// Result type for platform adapter operations
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidInput(_) => 3,
            CrosspostError::Platform(e) if e.kind.requires_reauthorization() => 2,
            CrosspostError::Platform(_) => 1,
            CrosspostError::Config(_) => 1,
            CrosspostError::Database(_) => 1,
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

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

/// Classification of a platform leg failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No active linked account for (user, platform)
    AccountNotConnected,
    /// Token refresh failed or credentials were permanently rejected
    CredentialInvalid,
    /// Content failed platform-specific validation
    ContentRejected,
    /// Platform throttled the request
    RateLimited,
    /// Network call or media processing exceeded its bound
    Timeout,
    /// Transient platform-side or transport failure
    Transient,
    /// Platform refused the operation for this account
    PermissionDenied,
    /// Platform reports the same content was already posted
    DuplicatePost,
    /// Platform rejected the access token
    InvalidCredentials,
    /// Post call succeeded but existence could not be confirmed
    VerificationTimeout,
    /// No adapter is registered for the platform
    Unsupported,
    /// Platform answered with a body we could not interpret
    InvalidResponse,
}

impl ErrorKind {
    /// Whether re-attempting the same operation may succeed without
    /// caller intervention
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::Timeout | ErrorKind::Transient
        )
    }

    /// Whether the user has to re-link the account before this can succeed
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            ErrorKind::AccountNotConnected
                | ErrorKind::CredentialInvalid
                | ErrorKind::InvalidCredentials
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AccountNotConnected => "account_not_connected",
            ErrorKind::CredentialInvalid => "credential_invalid",
            ErrorKind::ContentRejected => "content_rejected",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transient => "transient",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::DuplicatePost => "duplicate_post",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::VerificationTimeout => "verification_timeout",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::InvalidResponse => "invalid_response",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified platform failure
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct PlatformError {
    pub kind: ErrorKind,
    pub message: String,
    /// Server-provided hint for when to try again (e.g. `Retry-After`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
    /// Individual validation errors for `ContentRejected`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl PlatformError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            details: Vec::new(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn account_not_connected(platform: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::AccountNotConnected,
            format!("No active {} account is linked", platform),
        )
    }

    pub fn credential_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialInvalid, message)
    }

    /// Validation failure carrying every individual error
    pub fn content_rejected(errors: Vec<String>) -> Self {
        Self {
            kind: ErrorKind::ContentRejected,
            message: errors.join("; "),
            retry_after: None,
            details: errors,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
