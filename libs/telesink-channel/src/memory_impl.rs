//! In-memory channel implementation
//!
//! One FIFO per class behind a `parking_lot` mutex. Waiting receivers park on
//! a per-class `Notify`; senders store a permit so a record pushed between the
//! emptiness check and the wait is never missed.

use crate::error::{ChannelError, Result};
use crate::traits::*;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct ClassQueue {
    records: Mutex<VecDeque<Bytes>>,
    notify: Notify,
}

/// In-memory channel with per-class queues
pub struct MemoryChannel {
    queues: [ClassQueue; 3],
    max_message_size: usize,
    closed: AtomicBool,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            queues: Default::default(),
            max_message_size,
            closed: AtomicBool::new(false),
        }
    }

    fn queue(&self, class: MessageClass) -> &ClassQueue {
        match class {
            MessageClass::Metric => &self.queues[0],
            MessageClass::Alarm => &self.queues[1],
            MessageClass::LogLine => &self.queues[2],
        }
    }

    /// Reject further traffic and wake every waiting receiver
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for queue in &self.queues {
            queue.notify.notify_waiters();
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ChannelError::Closed)
        } else {
            Ok(())
        }
    }

    fn pop(&self, class: MessageClass) -> Option<Bytes> {
        self.queue(class)
            .records
            .lock()
            .pop_front()
            .map(|p| truncate_payload(p, self.max_message_size, class))
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&self, class: MessageClass, payload: Bytes) -> Result<()> {
        self.check_open()?;
        let queue = self.queue(class);
        queue.records.lock().push_back(payload);
        queue.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, class: MessageClass, mode: RecvMode) -> Result<Option<Bytes>> {
        self.check_open()?;
        let deadline = match mode {
            RecvMode::NoWait => return Ok(self.pop(class)),
            RecvMode::Wait(timeout) => Instant::now() + timeout,
        };

        loop {
            if let Some(payload) = self.pop(class) {
                return Ok(Some(payload));
            }
            let notified = self.queue(class).notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.pop(class));
            }
            self.check_open()?;
        }
    }

    async fn len(&self, class: MessageClass) -> Result<usize> {
        Ok(self.queue(class).records.lock().len())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_classes_are_independent() {
        let channel = MemoryChannel::new();
        channel
            .send(MessageClass::Metric, Bytes::from("1.3.6|5"))
            .await
            .unwrap();
        channel
            .send(MessageClass::Alarm, Bytes::from("alarm"))
            .await
            .unwrap();

        assert_eq!(channel.len(MessageClass::Metric).await.unwrap(), 1);
        assert!(channel.is_empty(MessageClass::LogLine).await.unwrap());
        assert_eq!(
            channel
                .receive(MessageClass::LogLine, RecvMode::NoWait)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            channel
                .receive(MessageClass::Alarm, RecvMode::NoWait)
                .await
                .unwrap(),
            Some(Bytes::from("alarm"))
        );
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let channel = MemoryChannel::new();
        for i in 0..3 {
            channel
                .send(MessageClass::LogLine, Bytes::from(format!("line {}\n", i)))
                .await
                .unwrap();
        }
        for i in 0..3 {
            let got = channel
                .receive(MessageClass::LogLine, RecvMode::NoWait)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(got, Bytes::from(format!("line {}\n", i)));
        }
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let channel = MemoryChannel::new();
        let started = std::time::Instant::now();
        let got = channel
            .receive(MessageClass::LogLine, RecvMode::Wait(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(got, None);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_send() {
        let channel = Arc::new(MemoryChannel::new());
        let receiver = {
            let channel = channel.clone();
            tokio::spawn(async move {
                channel
                    .receive(MessageClass::LogLine, RecvMode::Wait(Duration::from_secs(5)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        channel
            .send(MessageClass::LogLine, Bytes::from("late\n"))
            .await
            .unwrap();

        let got = receiver.await.unwrap().unwrap();
        assert_eq!(got, Some(Bytes::from("late\n")));
    }

    #[tokio::test]
    async fn test_oversized_payload_truncated() {
        let channel = MemoryChannel::with_max_message_size(8);
        channel
            .send(MessageClass::Alarm, Bytes::from("0123456789abcdef"))
            .await
            .unwrap();
        let got = channel
            .receive(MessageClass::Alarm, RecvMode::NoWait)
            .await
            .unwrap();
        assert_eq!(got, Some(Bytes::from("01234567")));
    }

    #[tokio::test]
    async fn test_close_rejects_traffic() {
        let channel = MemoryChannel::new();
        channel.close();
        assert!(matches!(
            channel.send(MessageClass::Metric, Bytes::from("x|1")).await,
            Err(ChannelError::Closed)
        ));
        assert!(matches!(
            channel.receive(MessageClass::Metric, RecvMode::NoWait).await,
            Err(ChannelError::Closed)
        ));
    }
}
