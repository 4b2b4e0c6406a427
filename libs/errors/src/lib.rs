//! Unified error handling for telesink crates
//!
//! Every component of the aggregation engine reports failures through
//! [`SinkError`]. Record-level problems (malformed payloads, unknown
//! identifiers) are recovered locally by the caller; storage failures abandon
//! one flush cycle; configuration errors are fatal at startup.

use thiserror::Error;

// ============================================================================
// SinkError - Main error type
// ============================================================================

/// Main error type for the telemetry sink
#[derive(Debug, Error)]
pub enum SinkError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    // ======================================
    // Resolution Errors
    // ======================================
    #[error("KPI name [{0}] has no configured identifier")]
    UnknownMetric(String),

    #[error("Alarm name [{0}] has no configured identifier and no wildcard default")]
    UnknownAlarm(String),

    // ======================================
    // Record Errors
    // ======================================
    #[error("Malformed record: [{0}]")]
    MalformedRecord(String),

    #[error("Unknown identifier [{identifier}] with delta [{delta}]")]
    UnknownIdentifier { identifier: String, delta: i64 },

    #[error("Counter [{identifier}] overflows with delta [{delta}]")]
    CounterOverflow { identifier: String, delta: i64 },

    // ======================================
    // Channel Errors
    // ======================================
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Timeout waiting for {0} record")]
    ChannelTimeout(String),

    #[error("Channel closed")]
    ChannelClosed,

    // ======================================
    // Storage Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Commit failed: {path}: {reason}")]
    CommitFailed { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ======================================
    // Catch-all
    // ======================================
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SinkError
pub type SinkResult<T> = Result<T, SinkError>;

/// Error category enum - used for classification in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    NotFound,
    Transport,
    Timeout,
    Storage,
    Unknown,
}

impl SinkError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Shorthand for an invalid configuration field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a failed commit of `path`
    pub fn commit_failed(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        Self::CommitFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Stable error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotInitialized(_) => "NOT_INITIALIZED",
            Self::UnknownMetric(_) => "UNKNOWN_METRIC",
            Self::UnknownAlarm(_) => "UNKNOWN_ALARM",
            Self::MalformedRecord(_) => "MALFORMED_RECORD",
            Self::UnknownIdentifier { .. } => "UNKNOWN_IDENTIFIER",
            Self::CounterOverflow { .. } => "COUNTER_OVERFLOW",
            Self::Channel(_) => "CHANNEL_ERROR",
            Self::ChannelTimeout(_) => "CHANNEL_TIMEOUT",
            Self::ChannelClosed => "CHANNEL_CLOSED",
            Self::Io(_) => "IO_ERROR",
            Self::CommitFailed { .. } => "COMMIT_FAILED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    /// Category used to pick the log level
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,
            Self::InvalidArgument(_)
            | Self::MalformedRecord(_)
            | Self::CounterOverflow { .. }
            | Self::NotInitialized(_) => ErrorCategory::Validation,
            Self::UnknownMetric(_) | Self::UnknownAlarm(_) | Self::UnknownIdentifier { .. } => {
                ErrorCategory::NotFound
            },
            Self::Channel(_) | Self::ChannelClosed => ErrorCategory::Transport,
            Self::ChannelTimeout(_) => ErrorCategory::Timeout,
            Self::Io(_) | Self::CommitFailed { .. } | Self::Serialization(_) => {
                ErrorCategory::Storage
            },
            Self::Other(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this is the expected idle result of a bounded wait
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ChannelTimeout(_))
    }

    /// Level the runtime loops report this error at
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Storage | ErrorCategory::Configuration | ErrorCategory::Unknown => {
                Level::ERROR
            },
            ErrorCategory::Timeout => Level::DEBUG,
            _ => Level::WARN,
        }
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// Tests
#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_levels() {
        let commit = SinkError::CommitFailed {
            path: "/tmp/x".into(),
            reason: "disk full".into(),
        };
        assert_eq!(commit.category(), ErrorCategory::Storage);
        assert_eq!(commit.log_level(), tracing::Level::ERROR);
        assert_eq!(
            SinkError::Channel("broken pipe".into()).log_level(),
            tracing::Level::WARN
        );
        assert_eq!(
            SinkError::config("kpi_interval must be positive").log_level(),
            tracing::Level::ERROR
        );
        assert_eq!(
            SinkError::MalformedRecord("abc".into()).category(),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn test_error_display() {
        let err = SinkError::UnknownIdentifier {
            identifier: "UNKNOWN_ID".into(),
            delta: 7,
        };
        assert_eq!(
            err.to_string(),
            "Unknown identifier [UNKNOWN_ID] with delta [7]"
        );
        assert_eq!(err.error_code(), "UNKNOWN_IDENTIFIER");
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_timeout_is_quiet() {
        let err = SinkError::ChannelTimeout("LOG_LINE".into());
        assert!(err.is_timeout());
        assert_eq!(err.log_level(), tracing::Level::DEBUG);
    }
}
