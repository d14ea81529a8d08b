//! Error types for Reelcast

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReelcastError>;

#[derive(Error, Debug)]
pub enum ReelcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint store error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Media probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ReelcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ReelcastError::InvalidInput(_) => 3,
            ReelcastError::Platform(PlatformError::Authentication(_)) => 2,
            ReelcastError::Platform(_) => 1,
            ReelcastError::Config(_) => 1,
            ReelcastError::Checkpoint(_) => 1,
            ReelcastError::Probe(_) => 1,
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
pub enum CheckpointError {
    #[error("Checkpoint query failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe tool unavailable: {0}")]
    Unavailable(String),

    #[error("probe failed: {0}")]
    Failed(String),

    #[error("probe output malformed: {0}")]
    Malformed(String),
}

/// Low-level failure class reported by an HTTP transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Reset,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Connect => write!(f, "connect"),
            TransportErrorKind::Reset => write!(f, "connection reset"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Raw failure surfaced by a platform adapter.
///
/// Adapters keep the HTTP status, vendor error code and any advertised
/// `Retry-After` so that `PlatformAdapter::classify` can bucket the error
/// without re-parsing messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("HTTP {status} during {context}: {message}")]
    Http {
        context: String,
        status: u16,
        code: Option<String>,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Network error during {context} ({kind}): {message}")]
    Transport {
        context: String,
        kind: TransportErrorKind,
        message: String,
    },

    #[error("Unexpected response during {context}: {message}")]
    Protocol { context: String, message: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content rejected: {0}")]
    Rejected(String),

    #[error("Platform not configured: {0}")]
    NotConfigured(String),
}

impl PlatformError {
    pub fn http(context: &str, status: u16, message: impl Into<String>) -> Self {
        PlatformError::Http {
            context: context.to_string(),
            status,
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn transport(context: &str, kind: TransportErrorKind, message: impl Into<String>) -> Self {
        PlatformError::Transport {
            context: context.to_string(),
            kind,
            message: message.into(),
        }
    }

    pub fn protocol(context: &str, message: impl Into<String>) -> Self {
        PlatformError::Protocol {
            context: context.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status, if the failure came from a platform response
    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-advertised wait before retrying
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PlatformError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = ReelcastError::InvalidInput("No platforms requested".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = ReelcastError::Platform(PlatformError::Authentication(
            "refresh token revoked".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        let http = ReelcastError::Platform(PlatformError::http("upload chunk", 503, "busy"));
        assert_eq!(http.exit_code(), 1);

        let config = ReelcastError::Config(ConfigError::MissingField("youtube.token_file".into()));
        assert_eq!(config.exit_code(), 1);

        let probe = ReelcastError::Probe(ProbeError::Unavailable("ffprobe".into()));
        assert_eq!(probe.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = ReelcastError::Platform(PlatformError::http(
            "start upload session",
            403,
            "quotaExceeded",
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: HTTP 403 during start upload session: quotaExceeded"
        );

        let transport =
            PlatformError::transport("upload chunk", TransportErrorKind::Reset, "peer hung up");
        assert_eq!(
            transport.to_string(),
            "Network error during upload chunk (connection reset): peer hung up"
        );
    }

    #[test]
    fn test_retry_after_only_on_http() {
        let error = PlatformError::Http {
            context: "publish".to_string(),
            status: 429,
            code: None,
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(error.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(error.status(), Some(429));

        let protocol = PlatformError::protocol("publish", "missing id");
        assert_eq!(protocol.retry_after(), None);
        assert_eq!(protocol.status(), None);
    }

    #[test]
    fn test_config_error_conversion() {
        let err: ReelcastError = ConfigError::InvalidValue {
            field: "upload.max_attempts".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into();
        assert!(matches!(err, ReelcastError::Config(_)));
        assert!(err.to_string().contains("upload.max_attempts"));
    }

    #[test]
    fn test_platform_error_clone() {
        // Retry loops keep a copy of the last failure
        let original = PlatformError::Rejected("policy violation".to_string());
        let cloned = original.clone();
        assert_eq!(original, cloned);
    }
}
