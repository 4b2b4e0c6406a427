//! Error types for telesink-channel

use errors::SinkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel backend error: {0}")]
    Backend(String),

    #[error("Channel closed")]
    Closed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

impl From<ChannelError> for SinkError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Closed => SinkError::ChannelClosed,
            ChannelError::Backend(msg) => SinkError::Channel(msg),
            ChannelError::Other(e) => SinkError::Channel(format!("{:#}", e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = ChannelError::Backend("connection refused".to_string());
        assert_eq!(err.to_string(), "Channel backend error: connection refused");
    }

    #[test]
    fn test_into_sink_error() {
        let sink: SinkError = ChannelError::Closed.into();
        assert!(matches!(sink, SinkError::ChannelClosed));

        let sink: SinkError = ChannelError::Other(anyhow::anyhow!("pool exhausted")).into();
        assert!(matches!(sink, SinkError::Channel(_)));
        assert_eq!(sink.to_string(), "Channel error: pool exhausted");
    }
}
