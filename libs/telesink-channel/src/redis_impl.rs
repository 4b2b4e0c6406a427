//! Redis implementation of the record channel
//!
//! Each class maps to one Redis list: producers `RPUSH`, the aggregator pops
//! from the head. Several sinks can share a server through distinct queue ids.

use crate::error::{ChannelError, Result};
use crate::traits::*;
use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use common::redis::{RedisClient, RedisConfig};
use std::sync::Arc;
use std::time::Duration;

/// Redis-backed channel
pub struct RedisChannel {
    client: Arc<RedisClient>,
    queue_id: i64,
    max_message_size: usize,
}

impl RedisChannel {
    /// Connect to `url` and verify the server answers
    pub async fn new(url: &str, queue_id: i64, max_message_size: usize) -> Result<Self> {
        let client = RedisClient::with_config(RedisConfig::from_url(url))
            .await
            .with_context(|| format!("Failed to open channel {} at {}", queue_id, url))?;
        Ok(Self::from_client(Arc::new(client), queue_id, max_message_size))
    }

    /// Create from existing RedisClient
    pub fn from_client(client: Arc<RedisClient>, queue_id: i64, max_message_size: usize) -> Self {
        Self {
            client,
            queue_id,
            max_message_size,
        }
    }

    pub fn queue_id(&self) -> i64 {
        self.queue_id
    }

    fn key(&self, class: MessageClass) -> String {
        class.queue_key(self.queue_id)
    }
}

/// BLPOP takes whole seconds and treats zero as "forever"
fn blpop_timeout_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl Channel for RedisChannel {
    async fn send(&self, class: MessageClass, payload: Bytes) -> Result<()> {
        self.client
            .rpush(&self.key(class), &payload)
            .await
            .map_err(|e| ChannelError::Backend(format!("{:#}", e)))?;
        Ok(())
    }

    async fn receive(&self, class: MessageClass, mode: RecvMode) -> Result<Option<Bytes>> {
        let key = self.key(class);
        let popped = match mode {
            RecvMode::NoWait => self.client.lpop(&key).await,
            RecvMode::Wait(wait) => self.client.blpop(&key, blpop_timeout_secs(wait)).await,
        }
        .map_err(|e| ChannelError::Backend(format!("{:#}", e)))?;

        Ok(popped.map(|p| truncate_payload(Bytes::from(p), self.max_message_size, class)))
    }

    async fn len(&self, class: MessageClass) -> Result<usize> {
        let len = self
            .client
            .llen(&self.key(class))
            .await
            .map_err(|e| ChannelError::Backend(format!("{:#}", e)))?;
        Ok(len as usize)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_blpop_timeout_rounds_up() {
        assert_eq!(blpop_timeout_secs(Duration::ZERO), 1);
        assert_eq!(blpop_timeout_secs(Duration::from_millis(200)), 1);
        assert_eq!(blpop_timeout_secs(Duration::from_secs(1)), 1);
        assert_eq!(blpop_timeout_secs(Duration::from_millis(1500)), 2);
    }

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_redis_channel_round_trip() {
        let channel = RedisChannel::new("redis://localhost:6379", 97001, 16)
            .await
            .unwrap();
        while channel
            .receive(MessageClass::Metric, RecvMode::NoWait)
            .await
            .unwrap()
            .is_some()
        {}

        channel
            .send(MessageClass::Metric, Bytes::from("1.3.6.1|5"))
            .await
            .unwrap();
        channel
            .send(MessageClass::Metric, Bytes::from("1.3.6.1.4.1.193.176|-2"))
            .await
            .unwrap();
        assert_eq!(channel.len(MessageClass::Metric).await.unwrap(), 2);

        assert_eq!(
            channel
                .receive(MessageClass::Metric, RecvMode::NoWait)
                .await
                .unwrap(),
            Some(Bytes::from("1.3.6.1|5"))
        );
        assert_eq!(
            channel
                .receive(MessageClass::Metric, RecvMode::Wait(Duration::from_secs(1)))
                .await
                .unwrap(),
            Some(Bytes::from("1.3.6.1.4.1.193."))
        );
        assert_eq!(
            channel
                .receive(MessageClass::Metric, RecvMode::Wait(Duration::from_secs(1)))
                .await
                .unwrap(),
            None
        );
    }
}
