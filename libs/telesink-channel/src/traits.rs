//! Trait definitions for the record channel

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Receive buffer size; longer payloads are cut
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024;

/// Default channel namespace id
pub const DEFAULT_QUEUE_ID: i64 = 7888;

/// Record class carried on the shared channel
///
/// The class is a property of the send/receive call, never of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// `{identifier}|{signed-integer}` counter deltas
    Metric,
    /// Fully formatted alarm lines
    Alarm,
    /// Free-text log lines, framed by the producer
    LogLine,
}

impl MessageClass {
    /// Wire tag shared with existing producers
    pub const fn tag(self) -> i64 {
        match self {
            Self::Metric => 10,
            Self::Alarm => 11,
            Self::LogLine => 12,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Metric => "METRIC_DELTA",
            Self::Alarm => "ALARM_EVENT",
            Self::LogLine => "LOG_LINE",
        }
    }

    /// Backend key for this class within queue `queue_id`
    pub fn queue_key(self, queue_id: i64) -> String {
        format!("telesink:{}:{}", queue_id, self.tag())
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How long a receive may wait for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvMode {
    /// Return `None` immediately when the class is empty
    NoWait,
    /// Wait up to the given duration, then return `None`
    Wait(Duration),
}

/// Class-tagged record transport
///
/// Implementations:
/// - `RedisChannel`: Redis lists, shared between processes
/// - `MemoryChannel`: in-process queues for tests and single-process use
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Append a record to the tail of `class`
    async fn send(&self, class: MessageClass, payload: Bytes) -> Result<()>;

    /// Pop the head record of `class`
    ///
    /// `Ok(None)` is the idle result: the class was empty (`NoWait`) or the
    /// wait elapsed (`Wait`). Payloads longer than the channel's maximum
    /// message size are truncated.
    async fn receive(&self, class: MessageClass, mode: RecvMode) -> Result<Option<Bytes>>;

    /// Number of queued records of `class`
    async fn len(&self, class: MessageClass) -> Result<usize>;

    async fn is_empty(&self, class: MessageClass) -> Result<bool> {
        Ok(self.len(class).await? == 0)
    }
}

/// Cut `payload` to at most `max` bytes
pub fn truncate_payload(payload: Bytes, max: usize, class: MessageClass) -> Bytes {
    if payload.len() <= max {
        return payload;
    }
    tracing::debug!(
        "{} record of {} bytes truncated to {}",
        class,
        payload.len(),
        max
    );
    payload.slice(..max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_tags() {
        assert_eq!(MessageClass::Metric.tag(), 10);
        assert_eq!(MessageClass::Alarm.tag(), 11);
        assert_eq!(MessageClass::LogLine.tag(), 12);
    }

    #[test]
    fn test_queue_key() {
        assert_eq!(MessageClass::LogLine.queue_key(7888), "telesink:7888:12");
    }

    #[test]
    fn test_truncate_payload() {
        let short = Bytes::from_static(b"abc");
        assert_eq!(truncate_payload(short.clone(), 3, MessageClass::Alarm), short);
        assert_eq!(
            truncate_payload(Bytes::from_static(b"abcdef"), 4, MessageClass::Alarm),
            Bytes::from_static(b"abcd")
        );
    }
}
